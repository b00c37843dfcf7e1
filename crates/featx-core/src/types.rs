//! Common types for featx
//!
//! Sample type, engine defaults and the frame/time conversions shared by the
//! engine, the adapters and the built-in plugins.

use std::time::Duration;

/// Audio sample type (32-bit float throughout the pipeline)
pub type Sample = f32;

/// Block size the engine feeds plugins with unless configured otherwise
pub const DEFAULT_BLOCK_SIZE: usize = 16384;

/// Channel count used until a transform or multiplexed source establishes one
pub const DEFAULT_CHANNELS: usize = 1;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Convert an absolute frame index to a timestamp at the given rate
pub fn frame_to_time(frame: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let rate = sample_rate as u64;
    let secs = frame / rate;
    let rem = (frame % rate) as u128;
    let nanos = rem * NANOS_PER_SEC / rate as u128;
    Duration::new(secs, nanos as u32)
}

/// Convert a timestamp to the frame it falls on at the given rate
///
/// The extra nanosecond keeps exact frame boundaries from rounding down to
/// the previous frame after a frame -> time -> frame round trip.
pub fn time_to_frame(time: Duration, sample_rate: u32) -> u64 {
    let nanos = time.as_nanos() + 1;
    (nanos * sample_rate as u128 / NANOS_PER_SEC) as u64
}

/// Serde helper storing a `Duration` as fractional seconds
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "invalid time {secs}: expected a non-negative number of seconds"
            )));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
