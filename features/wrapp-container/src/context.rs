use std::{
    cell::RefCell,
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use crate::{token::TokenKey, types::Instance};

/// Slot shared between a forward reference and the construction it waits on
pub(crate) type ForwardSlot = Arc<OnceLock<Instance>>;

/// A dependency requested by a factory while its dependencies are discovered
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DiscoveredDependency {
    pub token: TokenKey,
    pub optional: bool,
}

enum Mode {
    /// Factories build real values
    Build,
    /// Requested tokens are recorded, strict dependencies are built without being
    /// cached and references are placeholders
    Discover(RefCell<Vec<DiscoveredDependency>>),
}

/// State of one outer resolve call
///
/// Lives exactly as long as the outer call, every nested resolve made through a
/// [crate::Resolver] handed to a factory shares it.
pub(crate) struct ResolutionContext {
    path: RefCell<Vec<TokenKey>>,
    forwards: RefCell<HashMap<TokenKey, Vec<ForwardSlot>>>,
    mode: Mode,
}

impl ResolutionContext {
    pub fn new() -> Self {
        ResolutionContext {
            path: RefCell::new(Vec::new()),
            forwards: RefCell::new(HashMap::new()),
            mode: Mode::Build,
        }
    }

    pub fn discovery() -> Self {
        ResolutionContext {
            mode: Mode::Discover(RefCell::new(Vec::new())),
            ..Self::new()
        }
    }

    pub fn is_discovering(&self) -> bool {
        matches!(self.mode, Mode::Discover(_))
    }

    /// Records a direct dependency of the traced factory
    ///
    /// Requests made while building one of its dependencies are that dependency's own
    /// edges and are not recorded.
    pub fn record(&self, token: &TokenKey, optional: bool) {
        let Mode::Discover(discovered) = &self.mode else {
            return;
        };
        if self.path.borrow().len() > 1 {
            return;
        }
        let mut discovered = discovered.borrow_mut();
        if !discovered.iter().any(|dependency| &dependency.token == token) {
            discovered.push(DiscoveredDependency {
                token: token.clone(),
                optional,
            });
        }
    }

    pub fn into_discovered(self) -> Vec<DiscoveredDependency> {
        match self.mode {
            Mode::Discover(discovered) => discovered.into_inner(),
            Mode::Build => Vec::new(),
        }
    }

    pub fn contains(&self, token: &TokenKey) -> bool {
        self.path.borrow().contains(token)
    }

    pub fn path(&self) -> Vec<TokenKey> {
        self.path.borrow().clone()
    }

    /// Current path with `token` appended
    pub fn path_to(&self, token: &TokenKey) -> Vec<TokenKey> {
        let mut path = self.path();
        path.push(token.clone());
        path
    }

    pub fn enter(&self, token: &TokenKey) {
        self.path.borrow_mut().push(token.clone());
    }

    /// Pops `token` and hands the produced instance to every forward waiting on it
    pub fn leave(&self, token: &TokenKey, produced: Option<&Instance>) {
        let popped = self.path.borrow_mut().pop();
        debug_assert_eq!(popped.as_ref(), Some(token), "unbalanced resolution path");

        let waiting = self.forwards.borrow_mut().remove(token);
        if let (Some(slots), Some(instance)) = (waiting, produced) {
            tracing::trace!("Completing {} forward reference(s) to '{}'", slots.len(), token);
            for slot in slots {
                let _ = slot.set(instance.clone());
            }
        }
    }

    /// Creates a slot which is filled once the construction of `token` completes
    pub fn forward(&self, token: &TokenKey) -> ForwardSlot {
        let slot = ForwardSlot::default();
        self.forwards
            .borrow_mut()
            .entry(token.clone())
            .or_default()
            .push(slot.clone());
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &'static str) -> TokenKey {
        TokenKey::Named(name.into())
    }

    #[test]
    fn forwards_are_filled_when_the_token_leaves() {
        let context = ResolutionContext::new();
        context.enter(&key("a"));
        context.enter(&key("b"));
        assert!(context.contains(&key("a")));
        assert_eq!(context.path_to(&key("a")), vec![key("a"), key("b"), key("a")]);

        let slot = context.forward(&key("a"));
        context.leave(&key("b"), Some(&Instance::new("b")));
        assert!(slot.get().is_none());

        context.leave(&key("a"), Some(&Instance::new("a")));
        assert_eq!(*slot.get().unwrap().downcast::<&str>().unwrap(), "a");
        assert!(context.path().is_empty());
    }

    #[test]
    fn failed_constructions_leave_forwards_empty() {
        let context = ResolutionContext::new();
        context.enter(&key("a"));
        let slot = context.forward(&key("a"));
        context.leave(&key("a"), None);
        assert!(slot.get().is_none());
    }

    #[test]
    fn discovery_records_each_token_once() {
        let context = ResolutionContext::discovery();
        assert!(context.is_discovering());
        context.record(&key("a"), false);
        context.record(&key("a"), true);
        context.record(&key("b"), true);
        assert_eq!(
            context.into_discovered(),
            vec![
                DiscoveredDependency {
                    token: key("a"),
                    optional: false
                },
                DiscoveredDependency {
                    token: key("b"),
                    optional: true
                },
            ]
        );
    }

    #[test]
    fn nested_requests_are_not_recorded() {
        let context = ResolutionContext::discovery();
        context.enter(&key("traced"));
        context.record(&key("direct"), false);
        context.enter(&key("direct"));
        context.record(&key("nested"), false);
        context.leave(&key("direct"), None);
        context.leave(&key("traced"), None);
        assert_eq!(
            context.into_discovered(),
            vec![DiscoveredDependency {
                token: key("direct"),
                optional: false
            }]
        );
    }
}
