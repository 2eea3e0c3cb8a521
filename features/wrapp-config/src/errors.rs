use wrapp_container::ResolveError;

/// Errors when registering, retrieving or installing configs
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The required config type is not known
    #[error("The config type '{0}' is not registered")]
    Missing(&'static str),
    /// The config type is already registered
    #[error("The config type '{0}' is already registered")]
    AlreadyRegistered(&'static str),
    /// Installing a config into a container failed
    #[error(transparent)]
    Install(#[from] ResolveError),
}
