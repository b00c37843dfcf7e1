//! Run configuration
//!
//! A run is described in YAML: which transforms to extract, which summaries
//! to compute, engine settings and where audio comes from.
//!
//! ```yaml
//! transforms:
//!   - plugin: featx:power
//!     output: rms
//!     step_size: 512
//!     block_size: 1024
//!     start_time: 1.5
//!     duration: 10
//!   - plugin: featx:spectralcentroid
//!     summary: mean
//! default_transforms: [featx:zerocrossing]
//! summaries: [min, max]
//! segments: [30, 60]
//! sources: [track.flac, album/]
//! recursive: true
//! ```

mod io;
mod paths;

pub use io::{load_config, load_config_or_default, save_config};
pub use paths::{config_dir, default_config_path};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::ExtractionManager;
use crate::transform::{SummaryType, Transform};
use crate::types::{DEFAULT_BLOCK_SIZE, DEFAULT_CHANNELS};

/// Everything one batch run needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub transforms: Vec<Transform>,
    /// Plugin identifiers to run with their default transform
    pub default_transforms: Vec<String>,
    /// Summary kinds applied to every transform without its own summary
    pub summaries: Vec<SummaryType>,
    /// Write summaries only, no raw features
    pub summary_only: bool,
    /// Segment boundaries in seconds for summaries
    pub segments: Vec<f64>,
    /// Run sample rate; 0 takes the rate of the first source
    pub sample_rate: u32,
    pub channels: usize,
    pub block_size: usize,
    /// Writer format tags
    pub writers: Vec<String>,
    /// Audio files, playlists or directories
    pub sources: Vec<String>,
    /// Descend into subdirectories of directory sources
    pub recursive: bool,
    /// Read all sources as one multi-channel source
    pub multiplex: bool,
    /// Keep going when a source fails
    pub force: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            transforms: Vec::new(),
            default_transforms: Vec::new(),
            summaries: Vec::new(),
            summary_only: false,
            segments: Vec::new(),
            sample_rate: 0,
            channels: DEFAULT_CHANNELS,
            block_size: DEFAULT_BLOCK_SIZE,
            writers: vec!["default".to_string()],
            sources: Vec::new(),
            recursive: false,
            multiplex: false,
            force: false,
        }
    }
}

impl RunConfig {
    /// Segment boundaries as durations, sorted
    pub fn segment_boundaries(&self) -> anyhow::Result<Vec<Duration>> {
        let mut boundaries = self
            .segments
            .iter()
            .map(|&s| {
                Duration::try_from_secs_f64(s)
                    .map_err(|_| anyhow::anyhow!("Invalid segment boundary: {s}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        boundaries.sort();
        Ok(boundaries)
    }

    /// Whether the run asks for anything to be extracted
    pub fn has_work(&self) -> bool {
        !self.transforms.is_empty() || !self.default_transforms.is_empty()
    }

    /// Push engine settings into `manager`; must precede any registration
    pub fn apply_settings(&self, manager: &mut ExtractionManager) -> anyhow::Result<()> {
        manager.set_channels(self.channels)?;
        manager.set_block_size(self.block_size)?;
        if self.sample_rate != 0 {
            manager.set_default_sample_rate(self.sample_rate);
        }
        manager.set_continue_on_error(self.force);

        let boundaries = self.segment_boundaries()?;
        if !self.summaries.is_empty() || !boundaries.is_empty() {
            manager.set_summary_types(&self.summaries, self.summary_only, &boundaries)?;
        }
        Ok(())
    }
}
