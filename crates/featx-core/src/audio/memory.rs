//! In-memory audio source

use super::AudioSource;

/// Interleaved samples held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
    title: String,
    maker: String,
}

impl MemorySource {
    /// `samples` are interleaved; a trailing partial frame is dropped
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let mut samples = samples;
        samples.truncate(samples.len() - samples.len() % channels);
        Self {
            samples,
            channels,
            sample_rate,
            title: String::new(),
            maker: String::new(),
        }
    }

    /// Build from one sample vector per channel; shorter channels are padded with silence
    pub fn from_channels(channels: &[Vec<f32>], sample_rate: u32) -> Self {
        let count = channels.len().max(1);
        let frames = channels.iter().map(|c| c.len()).max().unwrap_or(0);
        let mut samples = vec![0.0; frames * count];
        for (c, data) in channels.iter().enumerate() {
            for (i, s) in data.iter().enumerate() {
                samples[i * count + c] = *s;
            }
        }
        Self::new(samples, count, sample_rate)
    }

    /// `frames` frames of silence
    pub fn silence(frames: usize, channels: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; frames * channels.max(1)], channels, sample_rate)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_maker(mut self, maker: impl Into<String>) -> Self {
        self.maker = maker.into();
        self
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

impl AudioSource for MemorySource {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_count(&self) -> u64 {
        (self.samples.len() / self.channels) as u64
    }

    fn interleaved_frames(&self, start: u64, count: usize) -> Vec<f32> {
        let total = self.samples.len();
        let from = (start as usize).saturating_mul(self.channels).min(total);
        let to = from.saturating_add(count * self.channels).min(total);
        self.samples[from..to].to_vec()
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn maker(&self) -> &str {
        &self.maker
    }
}
