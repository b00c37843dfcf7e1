//! Error taxonomy of the extraction engine
//!
//! - [`RegistrationError`]: a single transform could not be registered; the
//!   run continues with whatever did register
//! - [`ExtractionError`]: a source could not be extracted (or the run could
//!   not start); whether the run continues depends on continue-on-error

use thiserror::Error;

use crate::audio::SourceError;
use crate::plugin::PluginError;
use crate::writer::WriterError;

/// Reasons a transform could not be registered
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Neither the transform, the run nor a default supplied a sample rate
    #[error("No sample rate available for transform '{plugin_id}'")]
    NoSampleRate { plugin_id: String },

    #[error("Failed to load plugin for transform '{plugin_id}': {source}")]
    PluginLoad {
        plugin_id: String,
        #[source]
        source: PluginError,
    },

    #[error("Plugin '{plugin_id}' is version {found}, transform requires version {requested}")]
    VersionMismatch {
        plugin_id: String,
        requested: u32,
        found: u32,
    },

    #[error("Plugin '{plugin_id}' has no output '{output}' (available: {available})")]
    UnknownOutput {
        plugin_id: String,
        output: String,
        available: String,
    },

    #[error("Plugin '{plugin_id}' declares no outputs")]
    NoOutputs { plugin_id: String },

    #[error("Plugin initialise (channels = {channels}, block size = {block_size}) failed for '{plugin_id}': {source}")]
    InitialiseFailed {
        plugin_id: String,
        channels: usize,
        block_size: usize,
        #[source]
        source: PluginError,
    },
}

/// Failures while configuring or running extraction
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("No feature extractors registered")]
    NoTransforms,

    #[error(transparent)]
    Source(#[from] SourceError),

    /// A plugin failed while processing a source
    #[error("Plugin '{plugin_id}' failed on '{source_id}': {source}")]
    Plugin {
        plugin_id: String,
        source_id: String,
        #[source]
        source: PluginError,
    },

    #[error("Writer failed on '{source_id}': {source}")]
    Writer {
        source_id: String,
        #[source]
        source: WriterError,
    },

    #[error("Failed to finalise writer: {0}")]
    Finalise(#[source] WriterError),

    /// Source rate differs from the run rate after reopening; indicates a defect
    #[error("Internal error: '{source_id}' delivered {found} Hz, run rate is {expected} Hz")]
    RateInconsistency {
        source_id: String,
        expected: u32,
        found: u32,
    },

    /// Setting can no longer change once a transform is registered
    #[error("Cannot change {setting} after transforms have been registered")]
    ConfigurationLocked { setting: &'static str },

    #[error("Summary segment boundaries given without any summary type")]
    BoundariesWithoutSummaries,
}

impl ExtractionError {
    /// Internal inconsistencies and writer failures stop the run even when
    /// failing sources are otherwise skipped
    pub fn aborts_run(&self) -> bool {
        matches!(
            self,
            ExtractionError::Writer { .. }
                | ExtractionError::Finalise(_)
                | ExtractionError::RateInconsistency { .. }
        )
    }
}
