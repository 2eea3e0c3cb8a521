use std::{collections::HashSet, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    container::Container,
    controller::ControllerDef,
    encapsulation::{ModuleAccess, ModuleView},
    errors::ModuleError,
    module::{DynModule, Module, ModuleDescriptor, ModuleId, ModuleRef},
};

/// Options of a [ModuleRegistry]
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Run [Container::validate_scopes] once all modules are loaded
    pub validate_scopes: bool,
}

struct LoadedModule {
    id: ModuleId,
    module: Arc<dyn DynModule>,
    controllers: Vec<ControllerDef>,
    destroyed: bool,
}

/// Loads modules into a container, imports before their importers
///
/// Each module type is loaded at most once, no matter how often it is imported, so
/// diamond shaped and cyclic imports are fine.
#[derive(Default)]
pub struct ModuleRegistry {
    options: RegistryOptions,
    /// Registered modules in insertion order
    known: Vec<ModuleRef>,
    loaded: HashSet<ModuleId>,
    /// Load order, destroyed in reverse
    instances: Vec<LoadedModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RegistryOptions) -> Self {
        ModuleRegistry {
            options,
            ..Default::default()
        }
    }

    /// Adds a module to be loaded by [ModuleRegistry::load_modules], registering twice is a no-op
    pub fn register<M: Module + Default>(&mut self) -> &mut Self {
        self.register_ref(ModuleRef::of::<M>())
    }

    pub fn register_ref(&mut self, module: ModuleRef) -> &mut Self {
        if !self.known.contains(&module) {
            tracing::debug!("Registered module '{}'", module.name());
            self.known.push(module);
        }
        self
    }

    /// Loads every registered module in insertion order
    pub async fn load_modules(&mut self, container: &Container) -> Result<(), ModuleError> {
        let modules = self.known.clone();
        tracing::debug!("Loading {} module(s)", modules.len());

        for module in modules {
            self.load_module(module, container).await?;
        }

        if self.options.validate_scopes {
            container.validate_scopes()?;
        }
        Ok(())
    }

    /// Loads a module after all of its imports, then runs its init hook
    pub fn load_module<'a>(
        &'a mut self,
        module: ModuleRef,
        container: &'a Container,
    ) -> BoxFuture<'a, Result<(), ModuleError>> {
        async move {
            // Marked before the imports are loaded, an import cycle ends here
            if !self.loaded.insert(module.id()) {
                tracing::trace!("Module '{}' is already loaded", module.name());
                return Ok(());
            }

            let descriptor = module.descriptor();
            let registered = async {
                for import in descriptor.imports() {
                    self.load_module(*import, container).await?;
                }
                let instance = module.construct();
                register_module(container, &module, &descriptor, instance.as_ref())?;
                Ok::<_, ModuleError>(instance)
            }
            .await;
            // A module which failed to register is not loaded, a later attempt retries it
            let instance = match registered {
                Ok(instance) => instance,
                Err(error) => {
                    tracing::error!("Loading module '{}' failed: {}", module.name(), error);
                    self.loaded.remove(&module.id());
                    return Err(error);
                }
            };

            self.instances.push(LoadedModule {
                id: module.id(),
                module: instance.clone(),
                controllers: descriptor.controllers().to_vec(),
                destroyed: false,
            });

            // A failing init hook leaves the module loaded, its destroy hook still runs
            instance.on_module_init().await.map_err(|error| {
                tracing::error!("Init hook of module '{}' failed: {}", module.name(), error);
                ModuleError::Hook(error)
            })?;

            tracing::debug!("Loaded module '{}'", module.name());
            Ok(())
        }
        .boxed()
    }

    pub fn is_loaded<M: Module>(&self) -> bool {
        self.loaded.contains(&ModuleId::of::<M>())
    }

    pub fn is_loaded_ref(&self, module: &ModuleRef) -> bool {
        self.loaded.contains(&module.id())
    }

    /// Names of the instantiated modules in load order
    pub fn loaded_modules(&self) -> Vec<&'static str> {
        self.instances.iter().map(|loaded| loaded.id.name()).collect()
    }

    /// Controllers of all loaded modules in load order
    pub fn controllers(&self) -> impl Iterator<Item = &ControllerDef> {
        self.instances
            .iter()
            .flat_map(|loaded| loaded.controllers.iter())
    }

    /// Runs the destroy hooks in reverse load order, each module at most once
    ///
    /// A failing hook does not stop the remaining ones, the first failure is returned
    /// once all of them ran.
    pub async fn destroy_modules(&mut self) -> Result<(), ModuleError> {
        let mut first_error = None;
        for loaded in self.instances.iter_mut().rev() {
            if loaded.destroyed {
                continue;
            }
            loaded.destroyed = true;

            tracing::debug!("Destroying module '{}'", loaded.id.name());
            if let Err(error) = loaded.module.on_module_destroy().await {
                tracing::error!(
                    "Destroy hook of module '{}' failed: {}",
                    loaded.id.name(),
                    error
                );
                first_error.get_or_insert(ModuleError::Hook(error));
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Destroys all modules, then forgets about them even if a destroy hook failed
    pub async fn clear(&mut self) -> Result<(), ModuleError> {
        let destroyed = self.destroy_modules().await;
        self.known.clear();
        self.loaded.clear();
        self.instances.clear();
        destroyed
    }
}

/// Registers the module's bindings through its own view of the container
fn register_module(
    container: &Container,
    module: &ModuleRef,
    descriptor: &ModuleDescriptor,
    instance: &dyn DynModule,
) -> Result<(), ModuleError> {
    let access = Arc::new(ModuleAccess::new(module.id(), descriptor));
    let view = ModuleView::new(container, access);

    let registered = register_into(&view, descriptor, instance);
    if registered.is_err() {
        view.rollback();
    }
    registered
}

fn register_into(
    view: &ModuleView<'_>,
    descriptor: &ModuleDescriptor,
    instance: &dyn DynModule,
) -> Result<(), ModuleError> {
    for provider in descriptor.providers() {
        view.provide(provider)?;
    }
    for controller in descriptor.controllers() {
        view.provide(controller.provider())?;
    }
    instance.register(view)?;

    view.verify_exports()
}
