use std::{
    fmt::{Debug, Display},
    ops::Deref,
    sync::{Arc, OnceLock},
};

use crate::{
    binding::Binding,
    context::ForwardSlot,
    token::TokenKey,
    types::{Injectable, Instance},
};

/// Reference to a dependency which may still be under construction
///
/// Resolving a token which is already being constructed further up the resolution
/// path hands out an empty `LazyRef`. It is filled with the real instance as soon as
/// that outer construction completes, so two services may hold references to each
/// other.
///
/// Should only be accessed after the outer resolve has returned, never from inside
/// the factory which received it. If that outer construction failed, a singleton
/// reference is still filled by the next successful construction of the same binding.
///
/// ### Panics
///
/// [Deref] panics if the reference is still empty. Use [LazyRef::get] to check first.
pub struct LazyRef<T: Injectable> {
    token: TokenKey,
    slot: ForwardSlot,
    binding: Option<Arc<Binding>>,
    typed: OnceLock<Arc<T>>,
}

impl<T: Injectable> LazyRef<T> {
    pub(crate) fn resolved(token: TokenKey, instance: Instance, typed: Arc<T>) -> Self {
        LazyRef {
            token,
            slot: Arc::new(OnceLock::from(instance)),
            binding: None,
            typed: OnceLock::from(typed),
        }
    }

    pub(crate) fn forward(token: TokenKey, slot: ForwardSlot, binding: Arc<Binding>) -> Self {
        LazyRef {
            token,
            slot,
            binding: Some(binding),
            typed: OnceLock::new(),
        }
    }

    /// A reference which is never filled
    pub(crate) fn placeholder(token: TokenKey) -> Self {
        LazyRef {
            token,
            slot: ForwardSlot::default(),
            binding: None,
            typed: OnceLock::new(),
        }
    }

    /// Accesses the dependency, `None` while its construction has not completed
    pub fn get(&self) -> Option<&Arc<T>> {
        if let Some(typed) = self.typed.get() {
            return Some(typed);
        }

        let instance = match self.slot.get() {
            Some(instance) => instance.clone(),
            None => self.binding.as_ref()?.cached_singleton()?,
        };
        match instance.downcast::<T>() {
            Ok(typed) => Some(self.typed.get_or_init(|| typed)),
            Err(actual_type) => {
                tracing::error!(
                    "Forward reference to '{}' expected '{}' but got '{}'",
                    self.token,
                    std::any::type_name::<T>(),
                    actual_type
                );
                None
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.get().is_some()
    }

    pub fn token(&self) -> &TokenKey {
        &self.token
    }
}

impl<T: Injectable> Clone for LazyRef<T> {
    fn clone(&self) -> Self {
        LazyRef {
            token: self.token.clone(),
            slot: self.slot.clone(),
            binding: self.binding.clone(),
            typed: self.typed.clone(),
        }
    }
}

impl<T: Injectable> Deref for LazyRef<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self.get() {
            Some(instance) => instance,
            None => panic!(
                "LazyRef to '{}' accessed before its construction completed",
                self.token
            ),
        }
    }
}

impl<T: Injectable + Debug> Debug for LazyRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get() {
            Some(instance) => f.debug_tuple("LazyRef").field(instance).finish(),
            None => f
                .debug_tuple("LazyRef")
                .field(&format_args!("{self}"))
                .finish(),
        }
    }
}

impl<T: Injectable> Display for LazyRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_ready() {
            write!(f, "reference to `{}`", self.token)
        } else {
            write!(f, "circular reference to `{}`", self.token)
        }
    }
}
