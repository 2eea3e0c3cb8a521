use std::{collections::HashMap, fmt::Debug, sync::Arc};

use parking_lot::{Mutex, RwLock};

use crate::{
    binding::{erase_factory, Binding, BindingHandle, Provider, Scope},
    context::{ForwardSlot, ResolutionContext},
    encapsulation::ModuleAccess,
    errors::{ResolveError, ScopeValidationError},
    resolver::{downcast, Dependencies, Resolver},
    token::{Token, TokenKey},
    types::{DynError, Injectable, Instance, TypeInfo},
    validator::ScopeValidator,
};

/// Outcome of resolving a token inside a resolution context
pub(crate) enum Resolution {
    Ready(Instance),
    /// The token is still under construction, the slot is filled once it completes
    Forward(ForwardSlot, Arc<Binding>),
}

/// The binding table, shared by a root container and all its scopes
#[derive(Default)]
struct BindingTable {
    bindings: HashMap<TokenKey, Arc<Binding>>,
    /// Registration order
    order: Vec<TokenKey>,
}

/// Registers bindings and resolves tokens into instances
///
/// Cloning is cheap, clones refer to the same container. Child scopes created with
/// [Container::create_scope] share the root's bindings but keep their own scoped
/// instances.
#[derive(Clone)]
pub struct Container(Arc<ContainerInner>);
struct ContainerInner {
    table: Arc<RwLock<BindingTable>>,
    parent: Option<Container>,
    scoped: Mutex<HashMap<TokenKey, Instance>>,
}

impl Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.0.table.read();
        let mut map = f.debug_struct("Container");
        for token in &table.order {
            if let Some(binding) = table.bindings.get(token) {
                map.field(&token.to_string(), &binding.scope());
            }
        }
        map.finish()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Creates an empty root container
    pub fn new() -> Self {
        Container(Arc::new(ContainerInner {
            table: Arc::default(),
            parent: None,
            scoped: Mutex::default(),
        }))
    }

    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    /// The scope this one was created from
    pub fn parent(&self) -> Option<&Container> {
        self.0.parent.as_ref()
    }

    /// Binds a factory to the token, transient unless changed through the returned handle
    pub fn register<T, F>(&self, token: &Token<T>, factory: F) -> Result<BindingHandle, ResolveError>
    where
        T: Injectable,
        F: Fn(&Resolver<'_>) -> Result<T, DynError> + Send + Sync + 'static,
    {
        self.insert(Binding::new(
            token.key().clone(),
            TypeInfo::of::<T>(),
            erase_factory(factory),
            Scope::Transient,
            None,
        ))
    }

    /// Binds an already built value as a singleton
    pub fn register_value<T: Injectable>(
        &self,
        token: &Token<T>,
        value: T,
    ) -> Result<BindingHandle, ResolveError> {
        self.provide(&Provider::value(token, value))
    }

    /// Registers a declarative provider, visible to every module
    pub fn provide(&self, provider: &Provider) -> Result<BindingHandle, ResolveError> {
        self.insert(provider.to_binding(None))
    }

    pub(crate) fn insert(&self, binding: Binding) -> Result<BindingHandle, ResolveError> {
        if !self.is_root() {
            return Err(ResolveError::ChildScopeRegistration {
                token: binding.token().clone(),
            });
        }

        let mut table = self.0.table.write();
        if table.bindings.contains_key(binding.token()) {
            return Err(ResolveError::TokenCollision {
                token: binding.token().clone(),
            });
        }

        tracing::debug!(
            "Registered '{}' providing {} ({:?}{})",
            binding.token(),
            binding.provides(),
            binding.scope(),
            binding
                .owner_name()
                .map(|owner| format!(", module {owner}"))
                .unwrap_or_default()
        );

        let token = binding.token().clone();
        let binding = Arc::new(binding);
        table.bindings.insert(token.clone(), binding.clone());
        table.order.push(token);

        Ok(BindingHandle::new(binding))
    }

    /// Unbinds a token of the root container
    pub(crate) fn remove(&self, token: &TokenKey) -> Option<Arc<Binding>> {
        if !self.is_root() {
            return None;
        }

        let mut table = self.0.table.write();
        let removed = table.bindings.remove(token)?;
        table.order.retain(|bound| bound != token);
        tracing::debug!("Removed binding '{}'", token);
        Some(removed)
    }

    /// Resolves the token into an instance
    pub fn resolve<T: Injectable>(&self, token: &Token<T>) -> Result<Arc<T>, ResolveError> {
        let context = ResolutionContext::new();
        Resolver::new(self, &context, None).resolve(token)
    }

    /// Resolves without knowing the produced type
    pub fn resolve_instance(&self, token: &TokenKey) -> Result<Instance, ResolveError> {
        let context = ResolutionContext::new();
        match self.resolve_with(token, &context, None)? {
            Resolution::Ready(instance) => Ok(instance),
            // The path of a fresh context is empty, so nothing can be forwarded
            Resolution::Forward(..) => Err(ResolveError::CircularDependency {
                token: token.clone(),
                path: context.path_to(token),
            }),
        }
    }

    /// Resolves a list, tuple or map of tokens within one resolution path
    pub fn build_deps<D: Dependencies>(&self, dependencies: D) -> Result<D::Output, ResolveError> {
        let context = ResolutionContext::new();
        Resolver::new(self, &context, None).build_deps(dependencies)
    }

    /// True if anything is bound to the token
    pub fn has<K: AsRef<TokenKey> + ?Sized>(&self, token: &K) -> bool {
        self.contains(token.as_ref())
    }

    pub fn get_binding<K: AsRef<TokenKey> + ?Sized>(&self, token: &K) -> Option<Arc<Binding>> {
        self.binding(token.as_ref())
    }

    /// All bound tokens in registration order
    pub fn tokens(&self) -> Vec<TokenKey> {
        self.0.table.read().order.clone()
    }

    /// Drops every binding and cached instance
    ///
    /// A child scope only drops its own scoped instances, the bindings belong to the root.
    pub fn clear(&self) {
        if self.is_root() {
            let mut table = self.0.table.write();
            tracing::debug!("Clearing container with {} binding(s)", table.order.len());
            table.bindings.clear();
            table.order.clear();
        }
        self.0.scoped.lock().clear();
    }

    /// Creates a child scope with its own scoped instances
    pub fn create_scope(&self) -> Container {
        Container(Arc::new(ContainerInner {
            table: self.0.table.clone(),
            parent: Some(self.clone()),
            scoped: Mutex::default(),
        }))
    }

    /// Checks that no singleton can reach a scoped binding
    pub fn validate_scopes(&self) -> Result<(), ScopeValidationError> {
        if !self.is_root() {
            return Err(ScopeValidationError::NotRoot);
        }
        ScopeValidator::new(self).validate()
    }
}

// Resolution internals
impl Container {
    pub(crate) fn contains(&self, token: &TokenKey) -> bool {
        self.0.table.read().bindings.contains_key(token)
    }

    pub(crate) fn binding(&self, token: &TokenKey) -> Option<Arc<Binding>> {
        self.0.table.read().bindings.get(token).cloned()
    }

    pub(crate) fn bindings(&self) -> Vec<Arc<Binding>> {
        let table = self.0.table.read();
        table
            .order
            .iter()
            .filter_map(|token| table.bindings.get(token).cloned())
            .collect()
    }

    pub(crate) fn is_visible(&self, token: &TokenKey, requester: Option<&ModuleAccess>) -> bool {
        match self.binding(token) {
            Some(binding) => requester.map_or(true, |requester| requester.can_see(&binding).is_ok()),
            None => false,
        }
    }

    /// Tokens the requester is allowed to resolve
    pub(crate) fn visible_tokens(&self, requester: Option<&ModuleAccess>) -> Vec<TokenKey> {
        self.bindings()
            .into_iter()
            .filter(|binding| requester.map_or(true, |requester| requester.can_see(binding).is_ok()))
            .map(|binding| binding.token().clone())
            .collect()
    }

    fn cached_instance(&self, binding: &Binding) -> Option<Instance> {
        match binding.scope() {
            Scope::Transient => None,
            Scope::Singleton => binding.cached_singleton(),
            Scope::Scoped => self.0.scoped.lock().get(binding.token()).cloned(),
        }
    }

    fn store(&self, binding: &Binding, instance: Instance) -> Instance {
        match binding.scope() {
            Scope::Transient => instance,
            Scope::Singleton => binding.cache_singleton(instance),
            Scope::Scoped => self
                .0
                .scoped
                .lock()
                .entry(binding.token().clone())
                .or_insert(instance)
                .clone(),
        }
    }

    fn lookup(
        &self,
        token: &TokenKey,
        context: &ResolutionContext,
        requester: Option<&ModuleAccess>,
    ) -> Result<Arc<Binding>, ResolveError> {
        let Some(binding) = self.binding(token) else {
            return Err(ResolveError::TokenNotFound {
                token: token.clone(),
                path: context.path_to(token),
                visible: self.visible_tokens(requester),
            });
        };

        if let Some(requester) = requester {
            if let Err(reason) = requester.can_see(&binding) {
                return Err(requester.denied(&binding, reason, self.visible_tokens(Some(requester))));
            }
        }

        Ok(binding)
    }

    /// Resolves `token` on behalf of `requester`, sharing the resolution path of `context`
    ///
    /// A discovering context builds detached instances: the scope stays unlocked and
    /// nothing is cached.
    pub(crate) fn resolve_with(
        &self,
        token: &TokenKey,
        context: &ResolutionContext,
        requester: Option<&ModuleAccess>,
    ) -> Result<Resolution, ResolveError> {
        let binding = self.lookup(token, context, requester)?;

        if let Some(instance) = self.cached_instance(&binding) {
            tracing::trace!("Using cached instance of '{}'", token);
            return Ok(Resolution::Ready(instance));
        }

        if context.contains(token) {
            return Ok(Resolution::Forward(context.forward(token), binding));
        }

        let detached = context.is_discovering();
        if !detached {
            binding.lock_scope();
        }
        context.enter(token);
        let produced = {
            let nested = Resolver::new(self, context, binding.owner().map(Arc::as_ref));
            (binding.factory)(&nested)
        };

        match produced {
            Ok(instance) => {
                let instance = if detached {
                    instance
                } else {
                    self.store(&binding, instance)
                };
                context.leave(token, Some(&instance));
                tracing::debug!("Constructed instance of '{}' ({})", token, instance.info);
                Ok(Resolution::Ready(instance))
            }
            Err(error) => {
                context.leave(token, None);
                Err(ResolveError::from_factory(error))
            }
        }
    }

    /// Resolves and downcasts on behalf of a module
    pub(crate) fn resolve_as<T: Injectable>(
        &self,
        token: &Token<T>,
        requester: &ModuleAccess,
    ) -> Result<Arc<T>, ResolveError> {
        let context = ResolutionContext::new();
        match self.resolve_with(token.key(), &context, Some(requester))? {
            Resolution::Ready(instance) => downcast(token, &instance),
            Resolution::Forward(..) => Err(ResolveError::CircularDependency {
                token: token.key().clone(),
                path: context.path_to(token.key()),
            }),
        }
    }
}
