//! Extraction orchestration engine
//!
//! [`ExtractionManager`] owns everything that lives for a whole run:
//!
//! - the plugin instance cache and per-instance work lists ([`registry`])
//! - the queued audio sources
//! - run-wide settings: sample rate, channel count, block size, summaries
//!
//! A run is: register transforms (each with its writers), add sources, then
//! [`ExtractionManager::run`]. Every source is extracted in a single pass
//! over all plugin instances ([`extract`]), features are routed back to the
//! transforms that asked for them ([`router`]), summaries follow the raw
//! features ([`summary`]), and every distinct writer is finished once at the
//! end of the run.
//!
//! # Example
//!
//! ```ignore
//! use featx_core::{ExtractionManager, Transform};
//! use featx_core::writer::create_writer;
//!
//! let mut manager = ExtractionManager::new();
//! manager.set_default_sample_rate(44100);
//! let writer = create_writer("default")?;
//! manager.add_feature_extractor(Transform::new("featx:power").with_output("rms"), vec![writer])?;
//! manager.add_source("track.flac")?;
//! let report = manager.run()?;
//! ```

mod error;
mod extract;
mod feed;
mod registry;
mod router;
mod summary;
#[cfg(test)]
mod testing;

pub use error::{ExtractionError, RegistrationError};
pub use extract::RunReport;

use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Duration;

use crate::audio::{AudioSource, FileSourceProvider, SourceProvider};
use crate::plugin::adapters::SummarisingAdapter;
use crate::plugin::{OutputDescriptor, PluginLoader, PluginRegistry};
use crate::transform::{SummaryType, Transform};
use crate::types::{DEFAULT_BLOCK_SIZE, DEFAULT_CHANNELS};
use crate::writer::SharedWriter;

/// Stable handle of a plugin instance within one manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(usize);

/// A transform and the writers its features go to
struct TransformWork {
    transform: Transform,
    writers: Vec<SharedWriter>,
}

/// A loaded, adapter-wrapped plugin and the transforms it serves
struct PluginInstance {
    plugin: SummarisingAdapter,
    outputs: Vec<OutputDescriptor>,
    step_size: usize,
    block_size: usize,
    work: Vec<TransformWork>,
}

impl PluginInstance {
    fn output_index(&self, identifier: &str) -> Option<usize> {
        self.outputs.iter().position(|o| o.identifier == identifier)
    }

    /// Summary kinds this instance must produce: the run-wide ones plus any
    /// named by its own transforms
    fn summary_kinds(&self, run_kinds: &BTreeSet<SummaryType>) -> BTreeSet<SummaryType> {
        let mut kinds = run_kinds.clone();
        kinds.extend(
            self.work
                .iter()
                .map(|w| w.transform.summary)
                .filter(|s| !s.is_none()),
        );
        kinds
    }
}

/// Cache entry: a transform as registered (or as resolved) and its instance
struct CacheEntry {
    key: Transform,
    resolved: Transform,
    instance: InstanceId,
}

/// How a queued source is opened
enum SourceSpec {
    Single(String),
    Multiplexed(Vec<String>),
}

struct PendingSource {
    id: String,
    spec: SourceSpec,
    /// Only the source that supplied the default rate is kept open; it is
    /// reopened at extraction if the run rate changed since
    ready: Option<Box<dyn AudioSource>>,
}

/// Progress hook: source identifier and percentage complete
pub type ProgressCallback = Box<dyn FnMut(&str, u32)>;

pub struct ExtractionManager {
    loader: Box<dyn PluginLoader>,
    provider: Box<dyn SourceProvider>,
    instances: Vec<PluginInstance>,
    cache: Vec<CacheEntry>,
    /// Run sample rate, 0 until the first transform registers
    sample_rate: u32,
    default_sample_rate: u32,
    channels: usize,
    block_size: usize,
    summaries: BTreeSet<SummaryType>,
    summaries_only: bool,
    boundaries: Vec<Duration>,
    continue_on_error: bool,
    sources: Vec<PendingSource>,
    progress: Option<ProgressCallback>,
}

impl Default for ExtractionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionManager {
    /// Manager using the built-in plugins and local audio files
    pub fn new() -> Self {
        Self::with_components(
            Box::new(PluginRegistry::with_builtin()),
            Box::new(FileSourceProvider::new()),
        )
    }

    pub fn with_components(loader: Box<dyn PluginLoader>, provider: Box<dyn SourceProvider>) -> Self {
        Self {
            loader,
            provider,
            instances: Vec::new(),
            cache: Vec::new(),
            sample_rate: 0,
            default_sample_rate: 0,
            channels: DEFAULT_CHANNELS,
            block_size: DEFAULT_BLOCK_SIZE,
            summaries: BTreeSet::new(),
            summaries_only: false,
            boundaries: Vec::new(),
            continue_on_error: false,
            sources: Vec::new(),
            progress: None,
        }
    }

    fn locked(&self) -> bool {
        !self.instances.is_empty()
    }

    /// Channel count plugins are fed with; fixed once a transform registers
    pub fn set_channels(&mut self, channels: usize) -> Result<(), ExtractionError> {
        if self.locked() && channels != self.channels {
            return Err(ExtractionError::ConfigurationLocked {
                setting: "channel count",
            });
        }
        self.channels = channels.max(1);
        Ok(())
    }

    /// Block size the engine reads and feeds in; fixed once a transform registers
    pub fn set_block_size(&mut self, block_size: usize) -> Result<(), ExtractionError> {
        if self.locked() && block_size != self.block_size {
            return Err(ExtractionError::ConfigurationLocked { setting: "block size" });
        }
        self.block_size = block_size.max(1);
        Ok(())
    }

    /// Rate used for transforms that name none, until the run rate is set
    pub fn set_default_sample_rate(&mut self, sample_rate: u32) {
        self.default_sample_rate = sample_rate;
    }

    /// Request run-wide summaries
    ///
    /// Every transform without a summary of its own receives each of `kinds`.
    /// With `summaries_only` raw features are not written at all. Non-empty
    /// `boundaries` split each source into segments summarised separately.
    ///
    /// # Arguments
    ///
    /// * `kinds` - Summary kinds to produce; `SummaryType::None` entries are ignored
    /// * `summaries_only` - Suppress raw features
    /// * `boundaries` - Segment start times, in any order; requires at least one kind
    ///
    /// # Example
    ///
    /// ```ignore
    /// // Mean over 0-30 s, 30-60 s and 60 s to the end of each source
    /// manager.set_summary_types(
    ///     &[SummaryType::Mean],
    ///     true,
    ///     &[Duration::from_secs(30), Duration::from_secs(60)],
    /// )?;
    /// ```
    pub fn set_summary_types(
        &mut self,
        kinds: &[SummaryType],
        summaries_only: bool,
        boundaries: &[Duration],
    ) -> Result<(), ExtractionError> {
        let kinds: BTreeSet<SummaryType> = kinds.iter().copied().filter(|k| !k.is_none()).collect();
        if kinds.is_empty() && !boundaries.is_empty() {
            return Err(ExtractionError::BoundariesWithoutSummaries);
        }
        self.summaries = kinds;
        self.summaries_only = summaries_only;
        self.boundaries = boundaries.to_vec();

        for instance in self.instances.iter_mut() {
            if !self.summaries.is_empty() && !instance.plugin.is_summarising() {
                instance.plugin.enable(&self.boundaries);
            } else {
                instance.plugin.set_segment_boundaries(&self.boundaries);
            }
        }
        Ok(())
    }

    /// Skip failing sources instead of aborting the run
    pub fn set_continue_on_error(&mut self, continue_on_error: bool) {
        self.continue_on_error = continue_on_error;
    }

    pub fn set_progress_callback(&mut self, callback: impl FnMut(&str, u32) + 'static) {
        self.progress = Some(Box::new(callback));
    }

    /// Run sample rate, or 0 if not yet established
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of distinct plugin instances
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn has_transforms(&self) -> bool {
        !self.instances.is_empty()
    }

    /// Every registered (resolved) transform, grouped by instance in creation order
    pub fn transforms(&self) -> impl Iterator<Item = (InstanceId, &Transform)> {
        self.instances.iter().enumerate().flat_map(|(i, inst)| {
            inst.work
                .iter()
                .map(move |w| (InstanceId(i), &w.transform))
        })
    }

    /// Output descriptors of an instance
    pub fn outputs(&self, id: InstanceId) -> Option<&[OutputDescriptor]> {
        self.instances.get(id.0).map(|i| i.outputs.as_slice())
    }

    /// Whether an instance records features for summaries
    pub fn is_summarising(&self, id: InstanceId) -> bool {
        self.instances
            .get(id.0)
            .map_or(false, |i| i.plugin.is_summarising())
    }

    /// Identifiers of the queued sources, in extraction order
    pub fn source_ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id.clone()).collect()
    }

    /// Every distinct writer across all transforms, in first-registration order
    fn distinct_writers(&self) -> Vec<SharedWriter> {
        let mut writers: Vec<SharedWriter> = Vec::new();
        for work in self.instances.iter().flat_map(|i| i.work.iter()) {
            for writer in &work.writers {
                if !writers.iter().any(|w| Rc::ptr_eq(w, writer)) {
                    writers.push(writer.clone());
                }
            }
        }
        writers
    }
}
