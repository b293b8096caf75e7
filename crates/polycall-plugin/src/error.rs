//! Error types for plugin management.

use polycall_reflect::ReflectError;
use thiserror::Error;

/// Errors that can occur while managing plugins and loaders.
#[derive(Error, Debug)]
pub enum PluginError {
    /// A plugin was created without a name.
    #[error("Plugin name must not be empty")]
    EmptyName,

    /// A plugin with the same name is already registered.
    #[error("Plugin already exists: {0}")]
    AlreadyExists(String),

    /// No plugin, loader or function with that name.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The manager is not in a state that allows the operation.
    #[error("Invalid plugin manager state: {0}")]
    InvalidState(String),

    /// Neither the environment nor the default provided a library path.
    #[error("Invalid library path: {0}")]
    LibraryPath(String),

    /// Failed to parse or validate a loader manifest.
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// A loader failed to load guest code.
    #[error("Load error: {0}")]
    Load(String),

    /// Error raised by a value or function operation.
    #[error(transparent)]
    Reflect(#[from] ReflectError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for plugin operations.
pub type PluginResult<T> = std::result::Result<T, PluginError>;
