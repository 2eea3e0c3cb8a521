use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

use wrapp_container::{Container, Provider, Token};

use crate::errors::ConfigError;

struct ConfigEntry {
    name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    /// Singleton provider binding the config under its type token
    provider: Provider,
}

/// A provider to register all configs.
///
/// Configs can be registered and retrieved based on type. Once complete, the configs
/// are installed into a container where factories resolve them through [crate::Config].
#[derive(Default)]
pub struct ConfigProvider {
    configs: HashMap<TypeId, ConfigEntry>,
    /// Registration order
    order: Vec<TypeId>,
}

impl ConfigProvider {
    /// Initializes an empty Config Provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve a config with specified type.
    ///
    /// Returns `None` if the config type was never added
    pub fn get_config<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.configs
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value.clone().downcast().ok())
    }

    /// Like [ConfigProvider::get_config], but a missing config is an error
    pub fn require_config<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ConfigError> {
        self.get_config()
            .ok_or(ConfigError::Missing(type_name::<T>()))
    }

    /// Add a config to the registry.
    ///
    /// If the config type is already registered, it will return a
    /// [`ConfigError`] runtime error
    pub fn add_config<T: Send + Sync + 'static>(
        &mut self,
        config: T,
    ) -> Result<&mut Self, ConfigError> {
        let type_id = TypeId::of::<T>();
        let name = type_name::<T>();

        if self.configs.contains_key(&type_id) {
            return Err(ConfigError::AlreadyRegistered(name));
        }

        let value = Arc::new(config);
        let provider = Provider::shared(&Token::<T>::of_type(), value.clone());

        tracing::debug!("Added config '{}'", name);
        self.configs.insert(
            type_id,
            ConfigEntry {
                name,
                value,
                provider,
            },
        );
        self.order.push(type_id);
        Ok(self)
    }

    /// Can optionally add a config to the registry.
    ///
    /// If the config provided is `Some(T)`, it will be the same as calling [`ConfigProvider::add_config`]
    /// If the config provided is `None`, then the function just returns `Ok(self)` for chaining
    pub fn maybe_add_config<T: Send + Sync + 'static>(
        &mut self,
        config: Option<T>,
    ) -> Result<&mut Self, ConfigError> {
        match config {
            Some(c) => self.add_config(c),
            None => Ok(self),
        }
    }

    /// Names of the registered config types in registration order
    pub fn config_names(&self) -> Vec<&'static str> {
        self.order
            .iter()
            .filter_map(|type_id| self.configs.get(type_id))
            .map(|entry| entry.name)
            .collect()
    }

    /// One singleton provider per config, for module descriptors or a testing module
    pub fn providers(&self) -> Vec<Provider> {
        self.order
            .iter()
            .filter_map(|type_id| self.configs.get(type_id))
            .map(|entry| entry.provider.clone())
            .collect()
    }

    /// Binds every config into the container, visible to all modules
    pub fn install(&self, container: &Container) -> Result<(), ConfigError> {
        for provider in self.providers() {
            container.provide(&provider)?;
        }
        tracing::debug!("Installed {} config(s)", self.order.len());
        Ok(())
    }
}

impl std::fmt::Debug for ConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigProvider")
            .field("configs", &self.config_names())
            .finish()
    }
}
