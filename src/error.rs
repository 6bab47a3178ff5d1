//! Error types for plugin host operations.

use thiserror::Error;

/// Errors that can occur during plugin host operations.
#[derive(Debug, Error)]
pub enum HostError {
    /// Plugin not found in the discovered list
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// A plugin module resolved but failed to load
    #[error("Failed to load module '{file}' of '{id}': {message}")]
    ModuleLoad {
        id: String,
        file: String,
        message: String,
    },

    /// Package manager operation failed
    #[error("Package manager failed for '{id}': {message}")]
    PackageManager { id: String, message: String },

    /// Registry metadata lookup failed
    #[error("Registry lookup failed for '{id}': {message}")]
    Registry { id: String, message: String },

    /// Static asset could not be resolved
    #[error("{message}")]
    AssetNotFound { id: String, message: String },

    /// An action callback failed
    #[error("Action failed: {0}")]
    Action(String),

    /// A hook callback failed
    #[error("Hook failed: {0}")]
    Hook(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for plugin host operations
pub type Result<T> = std::result::Result<T, HostError>;
