//! Error types for analysis plugin hosting
//!
//! Structured errors for plugin loading, configuration, initialisation and
//! processing.

use thiserror::Error;

/// Errors that can occur while loading or driving an analysis plugin
#[derive(Debug, Error)]
pub enum PluginError {
    /// No plugin is registered under the requested key
    #[error("Plugin '{plugin_id}' not found")]
    NotFound { plugin_id: String },

    /// Plugin factory refused to create an instance
    #[error("Failed to load plugin '{plugin_id}': {reason}")]
    LoadFailed { plugin_id: String, reason: String },

    /// Parameter name is not declared by the plugin
    #[error("Plugin '{plugin_id}' has no parameter '{parameter}'")]
    UnknownParameter { plugin_id: String, parameter: String },

    /// Program name is not declared by the plugin
    #[error("Plugin '{plugin_id}' has no program '{program}'")]
    UnknownProgram { plugin_id: String, program: String },

    /// Channel count outside what the plugin accepts
    #[error("Plugin '{plugin_id}' cannot run on {channels} channel(s) (supports {min}..={max})")]
    UnsupportedChannelCount {
        plugin_id: String,
        channels: usize,
        min: usize,
        max: usize,
    },

    /// Plugin rejected its step/block configuration
    #[error("Failed to initialise plugin '{plugin_id}': {reason}")]
    InitialiseFailed { plugin_id: String, reason: String },

    /// Process called before a successful initialise
    #[error("Plugin '{plugin_id}' is not initialised")]
    NotInitialised { plugin_id: String },

    /// Plugin failed while processing a block
    #[error("Processing error in plugin '{plugin_id}': {reason}")]
    ProcessingError { plugin_id: String, reason: String },
}

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;
