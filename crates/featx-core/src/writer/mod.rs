//! Feature writer contract
//!
//! Writers serialize dispatched features to an output destination. The
//! engine shares one writer between any number of transforms, so writers are
//! handed around as [`SharedWriter`] and finalised exactly once per run.

mod default;

pub use default::DefaultFeatureWriter;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use thiserror::Error;

use crate::plugin::{Feature, OutputDescriptor};
use crate::transform::Transform;

/// Errors raised by writers
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The writer cannot produce output for this target
    #[error("Output target '{target}' rejected: {reason}")]
    Rejected { target: String, reason: String },

    #[error("Unknown writer format '{0}'")]
    UnknownFormat(String),
}

pub type WriterResult<T> = Result<T, WriterError>;

/// Per-source metadata sent to writers before any features
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub maker: String,
    pub duration: Duration,
}

pub trait FeatureWriter {
    /// One-line description of the output format
    fn description(&self) -> &str;

    /// Check ahead of extraction that output for `source_id` can be produced
    fn test_output(&mut self, _source_id: &str) -> WriterResult<()> {
        Ok(())
    }

    fn set_track_metadata(&mut self, _source_id: &str, _metadata: &TrackMetadata) -> WriterResult<()> {
        Ok(())
    }

    /// Write features of one output; `summary` is empty for unsummarised features
    fn write(
        &mut self,
        source_id: &str,
        transform: &Transform,
        output: &OutputDescriptor,
        features: &[Feature],
        summary: &str,
    ) -> WriterResult<()>;

    fn flush(&mut self) -> WriterResult<()> {
        Ok(())
    }

    /// Called once at the end of the run
    fn finish(&mut self) -> WriterResult<()> {
        Ok(())
    }
}

/// A writer shared between transforms
pub type SharedWriter = Rc<RefCell<dyn FeatureWriter>>;

/// Wrap a writer for sharing
pub fn shared<W: FeatureWriter + 'static>(writer: W) -> SharedWriter {
    Rc::new(RefCell::new(writer))
}

/// Tags accepted by [`create_writer`]
pub const WRITER_TAGS: &[&str] = &["default"];

/// Create a writer by format tag
pub fn create_writer(tag: &str) -> WriterResult<SharedWriter> {
    match tag {
        "default" => Ok(shared(DefaultFeatureWriter::stdout())),
        other => Err(WriterError::UnknownFormat(other.to_string())),
    }
}

/// Format a timestamp as seconds with nanosecond precision
pub fn format_time(t: Duration) -> String {
    format!("{}.{:09}", t.as_secs(), t.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_writer() {
        assert!(create_writer("default").is_ok());
        assert!(matches!(create_writer("csv"), Err(WriterError::UnknownFormat(_))));
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(Duration::from_millis(1500)), "1.500000000");
        assert_eq!(format_time(Duration::ZERO), "0.000000000");
    }
}
