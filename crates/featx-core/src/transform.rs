//! Transform descriptions
//!
//! A [`Transform`] is one requested analysis: which plugin and output to run,
//! at what rate and block geometry, over which time window, with which
//! parameters, and whether the caller wants a statistical summary instead of
//! the raw feature stream.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::types::duration_secs;

/// Statistical summary requested for a transform (or for a whole run)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SummaryType {
    #[serde(rename = "min")]
    Minimum,
    #[serde(rename = "max")]
    Maximum,
    #[serde(rename = "mean")]
    Mean,
    #[serde(rename = "median")]
    Median,
    #[serde(rename = "mode")]
    Mode,
    #[serde(rename = "sum")]
    Sum,
    #[serde(rename = "variance")]
    Variance,
    #[serde(rename = "sd")]
    StandardDeviation,
    #[serde(rename = "count")]
    Count,
    /// Raw feature stream, no summary
    #[default]
    #[serde(rename = "none")]
    None,
}

impl SummaryType {
    /// Every real summary kind, in canonical order
    pub const ALL: [SummaryType; 9] = [
        SummaryType::Minimum,
        SummaryType::Maximum,
        SummaryType::Mean,
        SummaryType::Median,
        SummaryType::Mode,
        SummaryType::Sum,
        SummaryType::Variance,
        SummaryType::StandardDeviation,
        SummaryType::Count,
    ];

    /// Short name used in configuration files and writer output
    ///
    /// `None` maps to the empty string, which is what writers receive as the
    /// summary label for unsummarised features.
    pub fn name(&self) -> &'static str {
        match self {
            SummaryType::Minimum => "min",
            SummaryType::Maximum => "max",
            SummaryType::Mean => "mean",
            SummaryType::Median => "median",
            SummaryType::Mode => "mode",
            SummaryType::Sum => "sum",
            SummaryType::Variance => "variance",
            SummaryType::StandardDeviation => "sd",
            SummaryType::Count => "count",
            SummaryType::None => "",
        }
    }

    pub fn is_none(&self) -> bool {
        *self == SummaryType::None
    }
}

impl fmt::Display for SummaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryType::None => f.write_str("none"),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for SummaryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(SummaryType::None),
            "min" | "minimum" => Ok(SummaryType::Minimum),
            "max" | "maximum" => Ok(SummaryType::Maximum),
            "mean" => Ok(SummaryType::Mean),
            "median" => Ok(SummaryType::Median),
            "mode" => Ok(SummaryType::Mode),
            "sum" => Ok(SummaryType::Sum),
            "variance" => Ok(SummaryType::Variance),
            "sd" | "stddev" => Ok(SummaryType::StandardDeviation),
            "count" => Ok(SummaryType::Count),
            other => Err(format!("unknown summary type '{other}'")),
        }
    }
}

/// Window shape applied before the FFT for frequency-domain plugins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    Rectangular,
    Triangular,
    Hamming,
    #[default]
    Hann,
    Blackman,
    Nuttall,
    #[serde(rename = "blackman-harris")]
    BlackmanHarris,
}

/// One requested analysis
///
/// Zero `sample_rate`, `step_size` and `block_size` mean "unspecified"; the
/// engine fills them in during registration. An empty `output` selects the
/// plugin's first output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    #[serde(rename = "plugin")]
    pub plugin_id: String,
    pub output: String,
    pub sample_rate: u32,
    pub step_size: usize,
    pub block_size: usize,
    pub window: WindowType,
    #[serde(with = "duration_secs")]
    pub start_time: Duration,
    /// Zero means "to the end of the source"
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub summary: SummaryType,
    pub parameters: BTreeMap<String, f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            plugin_id: String::new(),
            output: String::new(),
            sample_rate: 0,
            step_size: 0,
            block_size: 0,
            window: WindowType::default(),
            start_time: Duration::ZERO,
            duration: Duration::ZERO,
            summary: SummaryType::None,
            parameters: BTreeMap::new(),
            plugin_version: None,
            program: None,
        }
    }
}

impl Transform {
    /// Create a transform for the given plugin with every other field unspecified
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            ..Default::default()
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set step and block size
    pub fn with_sizes(mut self, step_size: usize, block_size: usize) -> Self {
        self.step_size = step_size;
        self.block_size = block_size;
        self
    }

    /// Restrict extraction to `[start, start + duration)`; zero duration runs to the end
    pub fn with_window(mut self, start_time: Duration, duration: Duration) -> Self {
        self.start_time = start_time;
        self.duration = duration;
        self
    }

    pub fn with_summary(mut self, summary: SummaryType) -> Self {
        self.summary = summary;
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: f32) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// True when both transforms can be served by one plugin instance
    ///
    /// Output and summary only select what is taken from an instance, not how
    /// the instance is configured.
    pub fn shares_instance_with(&self, other: &Transform) -> bool {
        let mut a = self.clone();
        a.output.clear();
        a.summary = SummaryType::None;
        let mut b = other.clone();
        b.output.clear();
        b.summary = SummaryType::None;
        a == b
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.plugin_id)?;
        if !self.output.is_empty() {
            write!(f, ":{}", self.output)?;
        }
        if !self.summary.is_none() {
            write!(f, " ({})", self.summary)?;
        }
        Ok(())
    }
}
