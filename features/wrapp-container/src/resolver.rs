use std::{any::type_name, collections::BTreeMap, sync::Arc};

use crate::{
    container::{Container, Resolution},
    context::ResolutionContext,
    encapsulation::ModuleAccess,
    errors::ResolveError,
    lazy::LazyRef,
    token::{Token, TokenKey},
    types::{Injectable, Instance},
};

/// Handle passed to factories for resolving their dependencies
///
/// Every resolve made through the same handle shares one resolution path, which is
/// how cycles are detected. The handle also carries the visibility of the module
/// which registered the factory.
pub struct Resolver<'a> {
    container: &'a Container,
    context: &'a ResolutionContext,
    requester: Option<&'a ModuleAccess>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(
        container: &'a Container,
        context: &'a ResolutionContext,
        requester: Option<&'a ModuleAccess>,
    ) -> Self {
        Resolver {
            container,
            context,
            requester,
        }
    }

    /// Resolves a dependency which has to be usable right away
    ///
    /// Fails with [ResolveError::CircularDependency] if the token is still under
    /// construction further up the path, use [Resolver::resolve_ref] for those.
    pub fn resolve<T: Injectable>(&self, token: &Token<T>) -> Result<Arc<T>, ResolveError> {
        self.context.record(token.key(), false);
        self.strict(token)
    }

    /// Resolves a dependency which may be part of a cycle
    pub fn resolve_ref<T: Injectable>(&self, token: &Token<T>) -> Result<LazyRef<T>, ResolveError> {
        if self.context.is_discovering() {
            self.context.record(token.key(), false);
            return Ok(LazyRef::placeholder(token.key().clone()));
        }

        match self.resolution(token.key())? {
            Resolution::Ready(instance) => {
                let typed = downcast(token, &instance)?;
                Ok(LazyRef::resolved(token.key().clone(), instance, typed))
            }
            Resolution::Forward(slot, binding) => {
                tracing::debug!(
                    "Handing out forward reference to '{}' (path: {:?})",
                    token,
                    self.context.path()
                );
                Ok(LazyRef::forward(token.key().clone(), slot, binding))
            }
        }
    }

    /// Resolves an optional dependency, `None` if nothing is bound to the token
    pub fn try_resolve<T: Injectable>(
        &self,
        token: &Token<T>,
    ) -> Result<Option<Arc<T>>, ResolveError> {
        if !self.container.contains(token.key()) {
            return Ok(None);
        }

        self.context.record(token.key(), true);
        self.strict(token).map(Some)
    }

    /// Resolves a list, tuple or map of tokens, keeping its shape
    ///
    /// Every element is resolved with [Resolver::resolve_ref], so the dependencies may
    /// form cycles.
    pub fn build_deps<D: Dependencies>(&self, dependencies: D) -> Result<D::Output, ResolveError> {
        dependencies.build(self)
    }

    /// True if the token is bound and visible to the factory's module
    pub fn has<K: AsRef<TokenKey> + ?Sized>(&self, token: &K) -> bool {
        self.container.is_visible(token.as_ref(), self.requester)
    }

    /// Tokens currently under construction, outermost first
    pub fn path(&self) -> Vec<TokenKey> {
        self.context.path()
    }

    fn resolution(&self, token: &TokenKey) -> Result<Resolution, ResolveError> {
        self.container
            .resolve_with(token, self.context, self.requester)
    }

    /// While tracing dependencies the instance is built detached, nothing is cached
    fn strict<T: Injectable>(&self, token: &Token<T>) -> Result<Arc<T>, ResolveError> {
        match self.resolution(token.key())? {
            Resolution::Ready(instance) => downcast(token, &instance),
            Resolution::Forward(..) => Err(ResolveError::CircularDependency {
                token: token.key().clone(),
                path: self.context.path_to(token.key()),
            }),
        }
    }
}

pub(crate) fn downcast<T: Injectable>(
    token: &Token<T>,
    instance: &Instance,
) -> Result<Arc<T>, ResolveError> {
    instance
        .downcast::<T>()
        .map_err(|actual_type| ResolveError::DowncastFailed {
            token: token.key().clone(),
            required_type: type_name::<T>(),
            actual_type,
        })
}

/// A shape of tokens which [Resolver::build_deps] can resolve in one go
pub trait Dependencies {
    type Output;

    fn build(self, resolver: &Resolver<'_>) -> Result<Self::Output, ResolveError>;
}

impl<T: Injectable> Dependencies for &Token<T> {
    type Output = LazyRef<T>;

    fn build(self, resolver: &Resolver<'_>) -> Result<Self::Output, ResolveError> {
        resolver.resolve_ref(self)
    }
}

/// Ordered list
impl<T: Injectable> Dependencies for Vec<&Token<T>> {
    type Output = Vec<LazyRef<T>>;

    fn build(self, resolver: &Resolver<'_>) -> Result<Self::Output, ResolveError> {
        self.into_iter()
            .map(|token| resolver.resolve_ref(token))
            .collect()
    }
}

/// Named mapping
impl<K: Ord, T: Injectable> Dependencies for BTreeMap<K, &Token<T>> {
    type Output = BTreeMap<K, LazyRef<T>>;

    fn build(self, resolver: &Resolver<'_>) -> Result<Self::Output, ResolveError> {
        self.into_iter()
            .map(|(name, token)| Ok((name, resolver.resolve_ref(token)?)))
            .collect()
    }
}

macro_rules! tuple_dependencies {
    ($($name:ident),+) => {
        impl<$($name: Dependencies),+> Dependencies for ($($name,)+) {
            type Output = ($($name::Output,)+);

            #[allow(non_snake_case)]
            fn build(self, resolver: &Resolver<'_>) -> Result<Self::Output, ResolveError> {
                let ($($name,)+) = self;
                Ok(($($name.build(resolver)?,)+))
            }
        }
    };
}

tuple_dependencies!(A);
tuple_dependencies!(A, B);
tuple_dependencies!(A, B, C);
tuple_dependencies!(A, B, C, D);
tuple_dependencies!(A, B, C, D, E);
tuple_dependencies!(A, B, C, D, E, F);
tuple_dependencies!(A, B, C, D, E, F, G);
tuple_dependencies!(A, B, C, D, E, F, G, H);
