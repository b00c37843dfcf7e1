//! Errors raised while locating, opening or decoding audio sources

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// File or location does not exist
    #[error("Audio source '{source_id}' could not be located")]
    NotFound { source_id: String },

    #[error("IO error reading '{source_id}': {source}")]
    Io {
        source_id: String,
        #[source]
        source: std::io::Error,
    },

    /// No demuxer/decoder for the source, or no audio track in it
    #[error("Unsupported audio format for '{source_id}': {reason}")]
    UnsupportedFormat { source_id: String, reason: String },

    #[error("Failed to decode '{source_id}': {reason}")]
    Decode { source_id: String, reason: String },

    #[error("Failed to resample '{source_id}' to {target_rate} Hz: {reason}")]
    Resample {
        source_id: String,
        target_rate: u32,
        reason: String,
    },

    /// Multiplexed inputs must share one sample rate
    #[error("Multiplexed source '{source_id}' has sample rate {found} Hz, expected {expected} Hz")]
    RateMismatch {
        source_id: String,
        expected: u32,
        found: u32,
    },

    #[error("Audio source '{source_id}' has {channels} channel(s), at least {required} required")]
    TooFewChannels {
        source_id: String,
        channels: usize,
        required: usize,
    },

    #[error("Audio source '{source_id}' was never added to this run")]
    NotRegistered { source_id: String },

    #[error("No inputs given for multiplexed source")]
    EmptyMultiplex,

    /// A writer refused its output target for this source
    #[error("Output for '{source_id}' rejected: {reason}")]
    WriterRejected { source_id: String, reason: String },

    #[error("Failed to read playlist '{path}': {reason}")]
    Playlist { path: PathBuf, reason: String },
}

impl SourceError {
    pub(crate) fn io(source_id: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            SourceError::NotFound {
                source_id: source_id.to_string(),
            }
        } else {
            SourceError::Io {
                source_id: source_id.to_string(),
                source,
            }
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err = SourceError::io("a.wav", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(matches!(err, SourceError::NotFound { .. }));
        let err = SourceError::io(
            "a.wav",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().contains("a.wav"));
    }
}
