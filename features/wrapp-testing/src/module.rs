use std::sync::Arc;

use wrapp_container::{
    Binding, Container, ControllerDef, Injectable, ModuleError, ModuleRegistry, ResolveError,
    RouteTable, Token, TokenKey,
};

use crate::builder::TestingModuleBuilder;

/// A compiled set of modules for tests
pub struct TestingModule {
    container: Container,
    registry: ModuleRegistry,
    controllers: Vec<ControllerDef>,
}

impl TestingModule {
    pub fn builder() -> TestingModuleBuilder {
        TestingModuleBuilder::new()
    }

    pub(crate) fn new(
        container: Container,
        registry: ModuleRegistry,
        controllers: Vec<ControllerDef>,
    ) -> Self {
        TestingModule {
            container,
            registry,
            controllers,
        }
    }

    /// Resolves from the root, private module tokens included
    pub fn get<T: Injectable>(&self, token: &Token<T>) -> Result<Arc<T>, ResolveError> {
        self.container.resolve(token)
    }

    pub fn has<K: AsRef<TokenKey> + ?Sized>(&self, token: &K) -> bool {
        self.container.has(token)
    }

    /// The binding behind a token, to inspect its scope or owning module
    pub fn get_binding<K: AsRef<TokenKey> + ?Sized>(&self, token: &K) -> Option<Arc<Binding>> {
        self.container.get_binding(token)
    }

    /// Every bound token in registration order
    pub fn tokens(&self) -> Vec<TokenKey> {
        self.container.tokens()
    }

    /// Mounts the controllers of every loaded module and of the testing module itself
    pub fn routes(&self) -> Result<RouteTable, ResolveError> {
        RouteTable::mount(
            &self.container,
            self.registry.controllers().chain(self.controllers.iter()),
        )
    }

    /// Runs the destroy hooks of all loaded modules and drops every binding
    ///
    /// The bindings are dropped even if a destroy hook fails.
    pub async fn close(mut self) -> Result<(), ModuleError> {
        let cleared = self.registry.clear().await;
        self.container.clear();
        cleared
    }
}
