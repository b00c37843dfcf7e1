//! Audio sources
//!
//! The engine reads audio exclusively through [`AudioSource`]: a fully
//! decoded, random-access view of interleaved frames at a single sample rate.
//! [`SourceProvider`] turns a source identifier (usually a path) into such a
//! view at the run's rate.

mod error;
mod file;
mod memory;
mod multiplex;
pub mod playlist;

pub use error::{SourceError, SourceResult};
pub use file::{FileSource, FileSourceProvider, SUPPORTED_EXTENSIONS};
pub use memory::MemorySource;
pub use multiplex::MultiplexedSource;

use std::time::Duration;

use crate::types::frame_to_time;

/// Random-access interleaved audio
pub trait AudioSource {
    fn channel_count(&self) -> usize;

    fn sample_rate(&self) -> u32;

    fn frame_count(&self) -> u64;

    /// Interleaved samples for `[start, start + count)`
    ///
    /// The returned block is shorter than `count * channels` when it runs past
    /// the end of the source; callers treat the missing part as silence.
    fn interleaved_frames(&self, start: u64, count: usize) -> Vec<f32>;

    fn title(&self) -> &str {
        ""
    }

    fn maker(&self) -> &str {
        ""
    }

    fn duration(&self) -> Duration {
        frame_to_time(self.frame_count(), self.sample_rate())
    }
}

/// Opens source identifiers
pub trait SourceProvider {
    /// Open `source_id`, converted to `sample_rate` when given, else at its native rate
    fn open(&self, source_id: &str, sample_rate: Option<u32>) -> SourceResult<Box<dyn AudioSource>>;

    /// Check that `source_id` can be opened, without decoding its audio
    fn check(&self, source_id: &str) -> SourceResult<()>;
}
