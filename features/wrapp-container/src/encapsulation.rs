use std::{
    cell::RefCell,
    collections::HashSet,
    sync::Arc,
};

use crate::{
    binding::{erase_factory, Binding, BindingHandle, Provider, Scope},
    container::Container,
    context::ResolutionContext,
    errors::{ModuleError, ResolveError, VisibilityDenial},
    module::{ModuleDescriptor, ModuleId},
    resolver::{Dependencies, Resolver},
    token::{Token, TokenKey},
    types::{DynError, Injectable, TypeInfo},
};

/// What a module may see: its own bindings plus the exports of modules it imports directly
#[derive(Debug)]
pub(crate) struct ModuleAccess {
    id: ModuleId,
    imports: HashSet<ModuleId>,
    exports: Vec<TokenKey>,
}

impl ModuleAccess {
    pub(crate) fn new(id: ModuleId, descriptor: &ModuleDescriptor) -> Self {
        ModuleAccess {
            id,
            imports: descriptor.imports().iter().map(|import| import.id()).collect(),
            exports: descriptor.exports().to_vec(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.id.name()
    }

    pub fn exports(&self, token: &TokenKey) -> bool {
        self.exports.contains(token)
    }

    /// Bindings registered outside of any module are visible everywhere
    pub(crate) fn can_see(&self, binding: &Binding) -> Result<(), VisibilityDenial> {
        let Some(owner) = binding.owner() else {
            return Ok(());
        };

        if owner.id == self.id {
            return Ok(());
        }
        if !owner.exports(binding.token()) {
            return Err(VisibilityDenial::NotExported);
        }
        if !self.imports.contains(&owner.id) {
            return Err(VisibilityDenial::NotImported);
        }
        Ok(())
    }

    pub(crate) fn denied(
        &self,
        binding: &Binding,
        reason: VisibilityDenial,
        accessible: Vec<TokenKey>,
    ) -> ResolveError {
        let owner = binding.owner_name().unwrap_or("<root>");
        tracing::debug!(
            "Module '{}' tried to access '{}' of module '{}': {}",
            self.name(),
            binding.token(),
            owner,
            reason
        );
        ResolveError::NonExportedToken {
            token: binding.token().clone(),
            owner,
            reason,
            accessible,
        }
    }
}

/// A module's view of the shared container, handed to [crate::Module::register]
///
/// Bindings registered through the view belong to the module. Lookups only see what
/// the module may access, invisible tokens behave as if they did not exist for
/// [ModuleView::has] and fail with [ResolveError::NonExportedToken] otherwise.
pub struct ModuleView<'c> {
    container: &'c Container,
    access: Arc<ModuleAccess>,
    /// Tokens this module provides, including ones overridden outside of any module
    provided: RefCell<Vec<TokenKey>>,
    /// Bindings this view inserted into the container
    inserted: RefCell<Vec<TokenKey>>,
}

impl<'c> ModuleView<'c> {
    pub(crate) fn new(container: &'c Container, access: Arc<ModuleAccess>) -> Self {
        ModuleView {
            container,
            access,
            provided: RefCell::new(Vec::new()),
            inserted: RefCell::new(Vec::new()),
        }
    }

    pub fn module_name(&self) -> &'static str {
        self.access.name()
    }

    /// Binds a factory owned by this module, see [Container::register]
    pub fn register<T, F>(&self, token: &Token<T>, factory: F) -> Result<BindingHandle, ResolveError>
    where
        T: Injectable,
        F: Fn(&Resolver<'_>) -> Result<T, DynError> + Send + Sync + 'static,
    {
        let handle = self.container.insert(Binding::new(
            token.key().clone(),
            TypeInfo::of::<T>(),
            erase_factory(factory),
            Scope::Transient,
            Some(self.access.clone()),
        ))?;
        self.track(token.key());
        Ok(handle)
    }

    /// Registers a declarative provider, skipped if the token is already bound
    ///
    /// A token bound outside of any module overrides the provider and still counts as
    /// provided by this module. A token owned by another module does not.
    pub fn provide(&self, provider: &Provider) -> Result<(), ResolveError> {
        let token = provider.token();
        if let Some(existing) = self.container.binding(token) {
            match existing.owner() {
                Some(owner) if owner.id != self.access.id => tracing::debug!(
                    "Module '{}' skips '{}', it is already provided by module '{}'",
                    self.module_name(),
                    token,
                    owner.name()
                ),
                _ => {
                    tracing::debug!(
                        "Module '{}' skips '{}', it is already bound",
                        self.module_name(),
                        token
                    );
                    self.provided.borrow_mut().push(token.clone());
                }
            }
            return Ok(());
        }

        self.container
            .insert(provider.to_binding(Some(self.access.clone())))?;
        self.track(token);
        Ok(())
    }

    fn track(&self, token: &TokenKey) {
        self.provided.borrow_mut().push(token.clone());
        self.inserted.borrow_mut().push(token.clone());
    }

    pub fn resolve<T: Injectable>(&self, token: &Token<T>) -> Result<Arc<T>, ResolveError> {
        self.container.resolve_as(token, &self.access)
    }

    pub fn build_deps<D: Dependencies>(&self, dependencies: D) -> Result<D::Output, ResolveError> {
        let context = ResolutionContext::new();
        Resolver::new(self.container, &context, Some(&self.access)).build_deps(dependencies)
    }

    /// False for tokens which exist but are not visible to this module
    pub fn has<K: AsRef<TokenKey> + ?Sized>(&self, token: &K) -> bool {
        self.container.is_visible(token.as_ref(), Some(&self.access))
    }

    pub fn get_binding<K: AsRef<TokenKey> + ?Sized>(
        &self,
        token: &K,
    ) -> Result<Arc<Binding>, ResolveError> {
        let token = token.as_ref();
        let Some(binding) = self.container.binding(token) else {
            return Err(ResolveError::TokenNotFound {
                token: token.clone(),
                path: vec![token.clone()],
                visible: self.accessible_tokens(),
            });
        };

        match self.access.can_see(&binding) {
            Ok(()) => Ok(binding),
            Err(reason) => Err(self.access.denied(&binding, reason, self.accessible_tokens())),
        }
    }

    /// Every token this module may resolve
    pub fn accessible_tokens(&self) -> Vec<TokenKey> {
        self.container.visible_tokens(Some(&self.access))
    }

    /// Removes every binding this view inserted
    pub(crate) fn rollback(&self) {
        for token in self.inserted.borrow_mut().drain(..).rev() {
            self.container.remove(&token);
        }
        self.provided.borrow_mut().clear();
    }

    /// Exports must name tokens this module provides
    pub(crate) fn verify_exports(&self) -> Result<(), ModuleError> {
        let provided = self.provided.borrow();
        for token in &self.access.exports {
            if !provided.contains(token) {
                return Err(ModuleError::InvalidExport {
                    module: self.module_name(),
                    token: token.clone(),
                });
            }
        }
        Ok(())
    }
}
