//! Error types for backend plugins
//!
//! Raised while discovering and loading plugins. They never reach the host
//! as panics: the manager logs them and reports "no backend".

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading a backend plugin
#[derive(Debug, Error)]
pub enum PluginError {
    /// No descriptor provides the requested backend
    #[error("No plugin provides backend '{0}'")]
    NotFound(String),

    /// Every descriptor for the backend is disabled
    #[error("Backend '{0}' is disabled")]
    Disabled(String),

    /// The shared library could not be opened
    #[error("Failed to load plugin library '{path}': {reason}")]
    LoadFailed { path: PathBuf, reason: String },

    /// A required entry point is missing from the library
    #[error("Plugin library '{path}' does not export '{symbol}'")]
    MissingSymbol { path: PathBuf, symbol: String },

    /// The factory entry point returned no backend
    #[error("Plugin factory failed for '{0}'")]
    FactoryFailed(String),

    /// IO error while scanning the plugin directory
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;
