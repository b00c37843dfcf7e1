//! Analysis plugin capability contract
//!
//! Every analysis algorithm, built-in or adapted, is driven through the
//! [`AnalysisPlugin`] trait. The engine never talks to a raw plugin directly:
//! it composes the adapters in [`adapters`] around the plugin so that every
//! instance presents a time-domain input, a fixed block/step geometry, a fixed
//! channel count and an optional statistical summary.
//!
//! ```text
//!   engine ─► Summarising ─► Channel ─► Buffering ─► InputDomain ─► plugin
//!                                                    (frequency-domain only)
//! ```

pub mod adapters;
mod error;
pub mod loader;

pub use error::{PluginError, PluginResult};
pub use loader::{PluginFactory, PluginLoader, PluginRegistry};

use std::collections::BTreeMap;
use std::time::Duration;

/// Domain a plugin expects its input blocks in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDomain {
    /// De-interleaved PCM samples, one slice per channel
    Time,
    /// Per channel `block + 2` floats: re/im pairs for bins `0..=block/2`
    Frequency,
}

/// How the features of an output are laid out in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleType {
    /// One feature per process call, stamped with the block timestamp
    PerBlock,
    /// One feature per step, stamped by the host
    OneSamplePerStep,
    /// Features at a fixed rate (Hz), optionally stamped by the plugin
    FixedSampleRate(f32),
    /// Features carry their own timestamps
    VariableSampleRate,
}

/// Metadata describing one output of a plugin
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDescriptor {
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub unit: String,
    /// Number of values per feature, `None` when it varies
    pub bin_count: Option<usize>,
    pub bin_names: Vec<String>,
    /// Known value range `(min, max)`
    pub extents: Option<(f32, f32)>,
    pub quantize_step: Option<f32>,
    pub sample_type: SampleType,
    pub has_duration: bool,
}

impl OutputDescriptor {
    /// Create a one-sample-per-step output with a single bin
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            bin_count: Some(1),
            bin_names: Vec::new(),
            extents: None,
            quantize_step: None,
            sample_type: SampleType::OneSamplePerStep,
            has_duration: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_bin_count(mut self, bin_count: Option<usize>) -> Self {
        self.bin_count = bin_count;
        self
    }

    pub fn with_extents(mut self, min: f32, max: f32) -> Self {
        self.extents = Some((min, max));
        self
    }

    pub fn with_quantize_step(mut self, step: f32) -> Self {
        self.quantize_step = Some(step);
        self
    }

    pub fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    pub fn with_duration(mut self, has_duration: bool) -> Self {
        self.has_duration = has_duration;
        self
    }
}

/// Metadata describing one tunable parameter of a plugin
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub identifier: String,
    pub name: String,
    pub unit: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub quantize_step: Option<f32>,
}

impl ParameterDescriptor {
    pub fn new(identifier: impl Into<String>, name: impl Into<String>, default: f32) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            unit: String::new(),
            min: 0.0,
            max: 1.0,
            default,
            quantize_step: None,
        }
    }

    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_quantize_step(mut self, step: f32) -> Self {
        self.quantize_step = Some(step);
        self
    }

    /// Clamp (and quantize) a requested value into this parameter's range
    pub fn constrain(&self, value: f32) -> f32 {
        let mut v = value.clamp(self.min, self.max);
        if let Some(step) = self.quantize_step.filter(|s| *s > 0.0) {
            v = self.min + ((v - self.min) / step).round() * step;
        }
        v
    }
}

/// One emitted datum
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feature {
    /// Absent for block-synchronous and one-per-step outputs until the host stamps it
    pub timestamp: Option<Duration>,
    pub duration: Option<Duration>,
    pub values: Vec<f32>,
    pub label: String,
}

impl Feature {
    /// Unstamped feature carrying the given values
    pub fn with_values(values: Vec<f32>) -> Self {
        Self {
            values,
            ..Default::default()
        }
    }

    /// Feature stamped at `timestamp`
    pub fn at(timestamp: Duration, values: Vec<f32>) -> Self {
        Self {
            timestamp: Some(timestamp),
            values,
            ..Default::default()
        }
    }
}

/// Output index -> features produced by one process or summary call
pub type FeatureSet = BTreeMap<usize, Vec<Feature>>;

/// Append every feature of `other` to `into`, keeping per-output order
pub fn merge_feature_sets(into: &mut FeatureSet, other: FeatureSet) {
    for (output, mut features) in other {
        into.entry(output).or_default().append(&mut features);
    }
}

/// An analysis algorithm
///
/// Instances are created for one input sample rate (see [`PluginLoader`]) and
/// are driven strictly sequentially: `initialise` once, then any number of
/// `process` calls followed by `remaining_features`, with `reset` between
/// sources.
pub trait AnalysisPlugin {
    /// Identifier unique within the plugin's library
    fn identifier(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn maker(&self) -> &str {
        ""
    }

    fn version(&self) -> u32;

    /// Sample rate the instance was created for
    fn input_sample_rate(&self) -> u32;

    fn input_domain(&self) -> InputDomain;

    /// Preferred step size in frames, 0 for no preference
    fn preferred_step_size(&self) -> usize {
        0
    }

    /// Preferred block size in frames, 0 for no preference
    fn preferred_block_size(&self) -> usize {
        0
    }

    fn min_channel_count(&self) -> usize {
        1
    }

    fn max_channel_count(&self) -> usize {
        1
    }

    fn parameter_descriptors(&self) -> Vec<ParameterDescriptor> {
        Vec::new()
    }

    fn parameter(&self, _identifier: &str) -> Option<f32> {
        None
    }

    fn set_parameter(&mut self, identifier: &str, _value: f32) -> PluginResult<()> {
        Err(PluginError::UnknownParameter {
            plugin_id: self.identifier().to_string(),
            parameter: identifier.to_string(),
        })
    }

    fn programs(&self) -> Vec<String> {
        Vec::new()
    }

    fn select_program(&mut self, program: &str) -> PluginResult<()> {
        Err(PluginError::UnknownProgram {
            plugin_id: self.identifier().to_string(),
            program: program.to_string(),
        })
    }

    /// Prepare for processing `channels` channels in blocks of `block_size`
    /// frames advancing by `step_size`
    fn initialise(&mut self, channels: usize, step_size: usize, block_size: usize)
        -> PluginResult<()>;

    /// Clear all state accumulated from previous input
    fn reset(&mut self);

    fn outputs(&self) -> Vec<OutputDescriptor>;

    /// Process one block; `input` holds one slice per channel
    fn process(&mut self, input: &[&[f32]], timestamp: Duration) -> PluginResult<FeatureSet>;

    /// Features that can only be produced once the whole input has been seen
    fn remaining_features(&mut self) -> PluginResult<FeatureSet>;
}
