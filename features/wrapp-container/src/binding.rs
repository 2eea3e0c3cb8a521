use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};

use parking_lot::Mutex;

use crate::{
    encapsulation::ModuleAccess,
    errors::ResolveError,
    resolver::Resolver,
    token::{Token, TokenKey},
    types::{DynError, Injectable, Instance, TypeInfo},
};

/// Lifetime of the values produced by a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// A new value for every resolve
    #[default]
    Transient,
    /// One value for the lifetime of the root container, shared with every child scope
    Singleton,
    /// One value per scope instance, the root container acting as its own scope
    Scoped,
}

pub(crate) type ErasedFactory =
    Arc<dyn Fn(&Resolver<'_>) -> Result<Instance, DynError> + Send + Sync>;

pub(crate) fn erase_factory<T, F>(factory: F) -> ErasedFactory
where
    T: Injectable,
    F: Fn(&Resolver<'_>) -> Result<T, DynError> + Send + Sync + 'static,
{
    Arc::new(move |resolver: &Resolver<'_>| factory(resolver).map(Instance::new))
}

/// How to construct the value behind a token
pub struct Binding {
    token: TokenKey,
    provides: TypeInfo,
    pub(crate) factory: ErasedFactory,
    scope: Mutex<Scope>,
    /// Set once the first construction starts, freezes the scope
    locked: AtomicBool,
    singleton: OnceLock<Instance>,
    owner: Option<Arc<ModuleAccess>>,
}

impl Binding {
    pub(crate) fn new(
        token: TokenKey,
        provides: TypeInfo,
        factory: ErasedFactory,
        scope: Scope,
        owner: Option<Arc<ModuleAccess>>,
    ) -> Self {
        Binding {
            token,
            provides,
            factory,
            scope: Mutex::new(scope),
            locked: AtomicBool::new(false),
            singleton: OnceLock::new(),
            owner,
        }
    }

    pub fn token(&self) -> &TokenKey {
        &self.token
    }

    /// Type the factory produces
    pub fn provides(&self) -> TypeInfo {
        self.provides
    }

    pub fn scope(&self) -> Scope {
        *self.scope.lock()
    }

    /// Name of the module which registered the binding
    pub fn owner_name(&self) -> Option<&'static str> {
        self.owner.as_ref().map(|owner| owner.name())
    }

    /// True once the singleton value has been built
    pub fn is_cached(&self) -> bool {
        self.singleton.get().is_some()
    }

    pub(crate) fn owner(&self) -> Option<&Arc<ModuleAccess>> {
        self.owner.as_ref()
    }

    pub(crate) fn set_scope(&self, scope: Scope) -> Result<(), ResolveError> {
        let mut current = self.scope.lock();
        if self.locked.load(Ordering::Acquire) {
            if *current == scope {
                return Ok(());
            }
            return Err(ResolveError::ScopeLocked {
                token: self.token.clone(),
                scope: *current,
            });
        }
        tracing::debug!("Binding '{}' is now {:?}", self.token, scope);
        *current = scope;
        Ok(())
    }

    pub(crate) fn lock_scope(&self) {
        self.locked.store(true, Ordering::Release);
    }

    pub(crate) fn cached_singleton(&self) -> Option<Instance> {
        self.singleton.get().cloned()
    }

    /// Stores the singleton, if another construction won the race its value is returned instead
    pub(crate) fn cache_singleton(&self, instance: Instance) -> Instance {
        self.singleton.get_or_init(|| instance).clone()
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("token", &self.token)
            .field("provides", &self.provides.type_name)
            .field("scope", &self.scope())
            .field("owner", &self.owner_name())
            .field("cached", &self.is_cached())
            .finish()
    }
}

/// One shot handle to pick the scope of a freshly registered binding
///
/// ```rust
/// # use wrapp_container::{Container, Token};
/// # fn main() -> Result<(), wrapp_container::ResolveError> {
/// let container = Container::new();
/// let counter = Token::<u32>::named("counter");
/// container.register(&counter, |_| Ok(42))?.as_singleton()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct BindingHandle {
    binding: Arc<Binding>,
}

impl BindingHandle {
    pub(crate) fn new(binding: Arc<Binding>) -> Self {
        BindingHandle { binding }
    }

    pub fn as_singleton(self) -> Result<Arc<Binding>, ResolveError> {
        self.with_scope(Scope::Singleton)
    }

    pub fn as_transient(self) -> Result<Arc<Binding>, ResolveError> {
        self.with_scope(Scope::Transient)
    }

    pub fn as_scoped(self) -> Result<Arc<Binding>, ResolveError> {
        self.with_scope(Scope::Scoped)
    }

    pub fn with_scope(self, scope: Scope) -> Result<Arc<Binding>, ResolveError> {
        self.binding.set_scope(scope)?;
        Ok(self.binding)
    }

    pub fn binding(&self) -> &Arc<Binding> {
        &self.binding
    }
}

/// Declarative description of a binding, registered later by a module or the testing harness
#[derive(Clone)]
pub struct Provider {
    token: TokenKey,
    provides: TypeInfo,
    scope: Scope,
    factory: ErasedFactory,
}

impl Provider {
    pub fn factory<T, F>(token: &Token<T>, factory: F) -> Self
    where
        T: Injectable,
        F: Fn(&Resolver<'_>) -> Result<T, DynError> + Send + Sync + 'static,
    {
        Provider {
            token: token.key().clone(),
            provides: TypeInfo::of::<T>(),
            scope: Scope::Transient,
            factory: erase_factory(factory),
        }
    }

    /// Binds an already built value, always a singleton
    pub fn value<T: Injectable>(token: &Token<T>, value: T) -> Self {
        Self::shared(token, Arc::new(value))
    }

    /// Binds a value which is already shared elsewhere, always a singleton
    pub fn shared<T: Injectable>(token: &Token<T>, value: Arc<T>) -> Self {
        Provider {
            token: token.key().clone(),
            provides: TypeInfo::of::<T>(),
            scope: Scope::Singleton,
            factory: Arc::new(move |_: &Resolver<'_>| Ok(Instance::from_arc(value.clone()))),
        }
    }

    pub fn singleton(self) -> Self {
        self.with_scope(Scope::Singleton)
    }

    pub fn scoped(self) -> Self {
        self.with_scope(Scope::Scoped)
    }

    pub fn transient(self) -> Self {
        self.with_scope(Scope::Transient)
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn token(&self) -> &TokenKey {
        &self.token
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub(crate) fn to_binding(&self, owner: Option<Arc<ModuleAccess>>) -> Binding {
        Binding::new(
            self.token.clone(),
            self.provides,
            self.factory.clone(),
            self.scope,
            owner,
        )
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("token", &self.token)
            .field("provides", &self.provides.type_name)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(scope: Scope) -> Binding {
        Provider::factory(&Token::<u8>::named("byte"), |_| Ok(1))
            .with_scope(scope)
            .to_binding(None)
    }

    #[test]
    fn scope_can_change_until_first_construction() {
        let binding = binding(Scope::Transient);
        binding.set_scope(Scope::Singleton).unwrap();
        binding.set_scope(Scope::Scoped).unwrap();
        assert_eq!(binding.scope(), Scope::Scoped);

        binding.lock_scope();
        let err = binding.set_scope(Scope::Singleton).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::ScopeLocked {
                scope: Scope::Scoped,
                ..
            }
        ));
        // Repeating the current scope is harmless
        binding.set_scope(Scope::Scoped).unwrap();
    }

    #[test]
    fn first_singleton_wins() {
        let binding = binding(Scope::Singleton);
        let first = binding.cache_singleton(Instance::new(1u8));
        let second = binding.cache_singleton(Instance::new(2u8));
        assert!(first.ptr_eq(&second));
        assert_eq!(*second.downcast::<u8>().unwrap(), 1);
    }

    #[test]
    fn value_providers_are_singletons() {
        let provider = Provider::value(&Token::named("name"), "wrapp".to_string());
        assert_eq!(provider.scope(), Scope::Singleton);
        assert_eq!(provider.transient().scope(), Scope::Transient);
    }
}
