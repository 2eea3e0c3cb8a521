use std::{future::Future, hash::Hash, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    binding::Provider,
    controller::ControllerDef,
    encapsulation::ModuleView,
    errors::ResolveError,
    token::{Token, TokenKey},
    types::{DynError, TypeInfo},
};

/// Identity of a module type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(TypeInfo);

impl ModuleId {
    pub fn of<M: 'static>() -> Self {
        ModuleId(TypeInfo::of::<M>())
    }

    pub fn name(&self) -> &'static str {
        self.0.type_name
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A unit of bindings with an explicit import/export contract
///
/// ```rust
/// use wrapp_container::{Module, ModuleDescriptor, Provider, Token};
///
/// const GREETING: Token<String> = Token::constant("greeting");
///
/// #[derive(Default)]
/// struct GreetingModule;
/// impl Module for GreetingModule {
///     fn descriptor() -> ModuleDescriptor {
///         ModuleDescriptor::new()
///             .provider(Provider::value(&GREETING, "hello".to_string()))
///             .export(&GREETING)
///     }
/// }
/// ```
pub trait Module: Send + Sync + 'static {
    /// Imports, providers, controllers and exports of the module
    fn descriptor() -> ModuleDescriptor
    where
        Self: Sized;

    /// Registers bindings which do not fit a declarative [Provider]
    ///
    /// Runs after the declared providers and controllers have been registered.
    fn register(&self, module: &ModuleView<'_>) -> Result<(), ResolveError> {
        let _ = module;
        Ok(())
    }

    /// Called once the module and all its imports are registered
    fn on_module_init(&self) -> impl Future<Output = Result<(), DynError>> + Send + '_ {
        async { Ok(()) }
    }

    /// Called while tearing down, in reverse load order
    fn on_module_destroy(&self) -> impl Future<Output = Result<(), DynError>> + Send + '_ {
        async { Ok(()) }
    }
}

/// Wrapper Trait for modules, allowing for dynamic dispatch
pub(crate) trait DynModule: Send + Sync {
    fn register(&self, module: &ModuleView<'_>) -> Result<(), ResolveError>;

    fn on_module_init(&self) -> BoxFuture<'_, Result<(), DynError>>;

    fn on_module_destroy(&self) -> BoxFuture<'_, Result<(), DynError>>;
}
// Impl DynModule for any Module
impl<SpecificModule: Module> DynModule for SpecificModule {
    fn register(&self, module: &ModuleView<'_>) -> Result<(), ResolveError> {
        Module::register(self, module)
    }

    fn on_module_init(&self) -> BoxFuture<'_, Result<(), DynError>> {
        Module::on_module_init(self).boxed()
    }

    fn on_module_destroy(&self) -> BoxFuture<'_, Result<(), DynError>> {
        Module::on_module_destroy(self).boxed()
    }
}

/// Handle to a module type: its identity plus how to describe and construct it
///
/// Only holds function pointers, so modules may import each other in cycles.
#[derive(Clone, Copy)]
pub struct ModuleRef {
    id: ModuleId,
    descriptor: fn() -> ModuleDescriptor,
    construct: fn() -> Arc<dyn DynModule>,
}

impl ModuleRef {
    pub fn of<M: Module + Default>() -> Self {
        ModuleRef {
            id: ModuleId::of::<M>(),
            descriptor: M::descriptor,
            construct: construct_module::<M>,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.id.name()
    }

    pub fn descriptor(&self) -> ModuleDescriptor {
        (self.descriptor)()
    }

    pub(crate) fn construct(&self) -> Arc<dyn DynModule> {
        (self.construct)()
    }
}

fn construct_module<M: Module + Default>() -> Arc<dyn DynModule> {
    Arc::new(M::default())
}

impl PartialEq for ModuleRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for ModuleRef {}
impl Hash for ModuleRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl std::fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ModuleRef").field(&self.name()).finish()
    }
}

/// Declarative contract of a module
#[derive(Default, Clone, Debug)]
pub struct ModuleDescriptor {
    imports: Vec<ModuleRef>,
    providers: Vec<Provider>,
    controllers: Vec<ControllerDef>,
    exports: Vec<TokenKey>,
}

impl ModuleDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `M` before this module and makes its exports visible here
    pub fn import<M: Module + Default>(self) -> Self {
        self.import_ref(ModuleRef::of::<M>())
    }

    pub fn import_ref(mut self, module: ModuleRef) -> Self {
        if !self.imports.contains(&module) {
            self.imports.push(module);
        }
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn controller(mut self, controller: ControllerDef) -> Self {
        self.controllers.push(controller);
        self
    }

    /// Makes one of this module's tokens visible to modules importing it
    pub fn export<T: ?Sized>(mut self, token: &Token<T>) -> Self {
        self.exports.push(token.key().clone());
        self
    }

    pub fn imports(&self) -> &[ModuleRef] {
        &self.imports
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn controllers(&self) -> &[ControllerDef] {
        &self.controllers
    }

    pub fn exports(&self) -> &[TokenKey] {
        &self.exports
    }
}
