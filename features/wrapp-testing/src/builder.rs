use wrapp_container::{
    Container, ControllerDef, Module, ModuleError, ModuleRef, ModuleRegistry, Provider,
};

use crate::module::TestingModule;

/// Collects the imports, providers and overrides of a [TestingModule]
///
/// The harness acts as an anonymous root module: its own providers and controllers
/// are registered outside of any module and therefore see everything.
#[derive(Default)]
pub struct TestingModuleBuilder {
    imports: Vec<ModuleRef>,
    providers: Vec<Provider>,
    controllers: Vec<ControllerDef>,
    overrides: Vec<Provider>,
    validate_scopes: bool,
}

impl TestingModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import<M: Module + Default>(self) -> Self {
        self.import_ref(ModuleRef::of::<M>())
    }

    pub fn import_ref(mut self, module: ModuleRef) -> Self {
        self.imports.push(module);
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

    /// Replaces whatever an imported module binds to the provider's token
    pub fn override_provider(mut self, provider: Provider) -> Self {
        self.overrides.push(provider);
        self
    }

    /// Validates scopes after compiling, see [Container::validate_scopes]
    pub fn validate_scopes(mut self, validate: bool) -> Self {
        self.validate_scopes = validate;
        self
    }

    /// Builds a fresh container from the collected parts
    ///
    /// Overrides are bound first, so imported modules skip their own providers for
    /// those tokens.
    pub async fn compile(self) -> Result<TestingModule, ModuleError> {
        let TestingModuleBuilder {
            imports,
            providers,
            controllers,
            overrides,
            validate_scopes,
        } = self;

        tracing::debug!(
            "Compiling testing module with {} import(s) and {} override(s)",
            imports.len(),
            overrides.len()
        );

        let container = Container::new();
        for provider in &overrides {
            container.provide(provider)?;
        }

        let mut registry = ModuleRegistry::new();
        for import in imports {
            registry.register_ref(import);
        }
        registry.load_modules(&container).await?;

        let own_providers = providers
            .iter()
            .chain(controllers.iter().map(ControllerDef::provider));
        for provider in own_providers {
            if container.has(provider.token()) {
                tracing::debug!("Testing module skips '{}', it is already bound", provider.token());
                continue;
            }
            container.provide(provider)?;
        }

        if validate_scopes {
            container.validate_scopes()?;
        }

        Ok(TestingModule::new(container, registry, controllers))
    }
}
