//! De-interleaving source blocks into the per-channel buffers plugins read

use crate::audio::AudioSource;

/// Reusable per-channel block buffers
///
/// With a mono run, multi-channel sources are mixed down by per-frame mean.
/// Otherwise channel `c` is copied from source channel `c`. Frames past the
/// end of the source read as silence, so the final block is always full.
pub(crate) struct ChannelFeed {
    channels: usize,
    block_size: usize,
    buffers: Vec<Vec<f32>>,
}

impl ChannelFeed {
    pub fn new(channels: usize, block_size: usize) -> Self {
        Self {
            channels,
            block_size,
            buffers: vec![vec![0.0; block_size]; channels],
        }
    }

    /// Load the block starting at frame `start`
    pub fn fill(&mut self, source: &dyn AudioSource, start: u64) {
        let source_channels = source.channel_count().max(1);
        let interleaved = source.interleaved_frames(start, self.block_size);
        let frames = (interleaved.len() / source_channels).min(self.block_size);

        for buffer in self.buffers.iter_mut() {
            buffer.fill(0.0);
        }

        if self.channels == 1 && source_channels > 1 {
            let scale = 1.0 / source_channels as f32;
            for (i, frame) in interleaved.chunks_exact(source_channels).take(frames).enumerate() {
                self.buffers[0][i] = frame.iter().sum::<f32>() * scale;
            }
            return;
        }

        let copied = self.channels.min(source_channels);
        for (i, frame) in interleaved.chunks_exact(source_channels).take(frames).enumerate() {
            for (c, buffer) in self.buffers.iter_mut().take(copied).enumerate() {
                buffer[i] = frame[c];
            }
        }
    }

    pub fn slices(&self) -> Vec<&[f32]> {
        self.buffers.iter().map(|b| b.as_slice()).collect()
    }
}
