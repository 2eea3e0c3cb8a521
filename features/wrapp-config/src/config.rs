use std::{ops::Deref, sync::Arc};

use wrapp_container::{Injectable, ResolveError, Resolver, Token};

/// A wrapper type to allow for config injections
///
/// This provides a simple way to retrieve configs installed by a
/// [crate::ConfigProvider] from inside a factory.
///
/// # Example
/// ```rust
/// use wrapp_config::{Config, ConfigProvider};
/// use wrapp_container::{Container, Token};
///
/// struct ServerConfig {
///     port: u16,
/// }
/// struct Server {
///     port: u16,
/// }
///
/// let container = Container::new();
/// let mut configs = ConfigProvider::new();
/// configs.add_config(ServerConfig { port: 8080 }).unwrap();
/// configs.install(&container).unwrap();
///
/// let server = Token::<Server>::named("server");
/// container
///     .register(&server, |r| {
///         let config = Config::<ServerConfig>::resolve(r)?;
///         Ok(Server { port: config.port })
///     })
///     .unwrap();
///
/// assert_eq!(container.resolve(&server).unwrap().port, 8080);
/// ```
pub struct Config<T> {
    inner: Arc<T>,
}
impl<T> Deref for Config<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Config {
            inner: self.inner.clone(),
        }
    }
}
impl<T> Config<T> {
    pub fn inner(&self) -> Arc<T> {
        self.inner.clone()
    }

    pub fn into_inner(self) -> Arc<T> {
        self.inner
    }
}

impl<T: Injectable> Config<T> {
    /// Token the config of type `T` is installed under
    pub fn token() -> Token<T> {
        Token::of_type()
    }

    /// Resolves the config, failing if it was never installed
    pub fn resolve(resolver: &Resolver<'_>) -> Result<Self, ResolveError> {
        let inner = resolver.resolve(&Self::token())?;
        Ok(Config { inner })
    }

    /// Resolves the config, `None` if it was never installed
    pub fn try_resolve(resolver: &Resolver<'_>) -> Result<Option<Self>, ResolveError> {
        Ok(resolver
            .try_resolve(&Self::token())?
            .map(|inner| Config { inner }))
    }
}
