//! Several sources presented as one, one channel per input

use super::{AudioSource, SourceError, SourceResult};

/// Each input becomes one channel: multi-channel inputs are first mixed down
/// to mono by per-frame mean. The frame count is that of the longest input.
pub struct MultiplexedSource {
    inputs: Vec<Box<dyn AudioSource>>,
    sample_rate: u32,
    frame_count: u64,
}

impl MultiplexedSource {
    /// Combine `inputs`; `ids` name them for error reporting
    pub fn new(inputs: Vec<Box<dyn AudioSource>>, ids: &[String]) -> SourceResult<Self> {
        let first = inputs.first().ok_or(SourceError::EmptyMultiplex)?;
        let sample_rate = first.sample_rate();

        for (i, input) in inputs.iter().enumerate() {
            if input.sample_rate() != sample_rate {
                return Err(SourceError::RateMismatch {
                    source_id: ids.get(i).cloned().unwrap_or_else(|| format!("input {}", i)),
                    expected: sample_rate,
                    found: input.sample_rate(),
                });
            }
        }

        let frame_count = inputs.iter().map(|s| s.frame_count()).max().unwrap_or(0);
        log::debug!(
            "MultiplexedSource: {} input(s) at {} Hz, {} frames",
            inputs.len(),
            sample_rate,
            frame_count
        );

        Ok(Self {
            inputs,
            sample_rate,
            frame_count,
        })
    }
}

impl AudioSource for MultiplexedSource {
    fn channel_count(&self) -> usize {
        self.inputs.len()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn interleaved_frames(&self, start: u64, count: usize) -> Vec<f32> {
        let out_channels = self.inputs.len();
        let available = self.frame_count.saturating_sub(start).min(count as u64) as usize;
        let mut block = vec![0.0; available * out_channels];

        for (out_channel, input) in self.inputs.iter().enumerate() {
            let in_channels = input.channel_count().max(1);
            let data = input.interleaved_frames(start, available);
            let scale = 1.0 / in_channels as f32;
            for (frame, samples) in data.chunks(in_channels).enumerate() {
                let sum: f32 = samples.iter().sum();
                block[frame * out_channels + out_channel] =
                    if in_channels > 1 { sum * scale } else { sum };
            }
        }
        block
    }

    fn title(&self) -> &str {
        self.inputs.first().map_or("", |s| s.title())
    }

    fn maker(&self) -> &str {
        self.inputs.first().map_or("", |s| s.maker())
    }
}
