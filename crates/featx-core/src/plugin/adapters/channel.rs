//! Channel count adapter
//!
//! Lets the engine initialise every plugin with the run's channel count even
//! when the plugin accepts a different range:
//!
//! - too many channels, plugin takes one: per-frame mean
//! - too many channels otherwise: excess channels dropped
//! - too few channels from a mono input: the input is duplicated
//! - too few channels otherwise: missing channels are silent

use std::time::Duration;

use crate::plugin::{
    AnalysisPlugin, FeatureSet, InputDomain, OutputDescriptor, ParameterDescriptor, PluginResult,
};

fn copy_padded(dst: &mut [f32], src: &[f32]) {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
    dst[n..].fill(0.0);
}

pub struct ChannelAdapter {
    plugin: Box<dyn AnalysisPlugin>,
    input_channels: usize,
    plugin_channels: usize,
    buffers: Vec<Vec<f32>>,
}

impl ChannelAdapter {
    pub fn new(plugin: Box<dyn AnalysisPlugin>) -> Self {
        Self {
            plugin,
            input_channels: 0,
            plugin_channels: 0,
            buffers: Vec::new(),
        }
    }

    /// Channel count the wrapped plugin was initialised with
    pub fn plugin_channels(&self) -> usize {
        self.plugin_channels
    }
}

impl AnalysisPlugin for ChannelAdapter {
    fn identifier(&self) -> &str {
        self.plugin.identifier()
    }

    fn name(&self) -> &str {
        self.plugin.name()
    }

    fn description(&self) -> &str {
        self.plugin.description()
    }

    fn maker(&self) -> &str {
        self.plugin.maker()
    }

    fn version(&self) -> u32 {
        self.plugin.version()
    }

    fn input_sample_rate(&self) -> u32 {
        self.plugin.input_sample_rate()
    }

    fn input_domain(&self) -> InputDomain {
        self.plugin.input_domain()
    }

    fn preferred_step_size(&self) -> usize {
        self.plugin.preferred_step_size()
    }

    fn preferred_block_size(&self) -> usize {
        self.plugin.preferred_block_size()
    }

    fn min_channel_count(&self) -> usize {
        1
    }

    fn max_channel_count(&self) -> usize {
        usize::MAX
    }

    fn parameter_descriptors(&self) -> Vec<ParameterDescriptor> {
        self.plugin.parameter_descriptors()
    }

    fn parameter(&self, identifier: &str) -> Option<f32> {
        self.plugin.parameter(identifier)
    }

    fn set_parameter(&mut self, identifier: &str, value: f32) -> PluginResult<()> {
        self.plugin.set_parameter(identifier, value)
    }

    fn programs(&self) -> Vec<String> {
        self.plugin.programs()
    }

    fn select_program(&mut self, program: &str) -> PluginResult<()> {
        self.plugin.select_program(program)
    }

    fn initialise(&mut self, channels: usize, step_size: usize, block_size: usize) -> PluginResult<()> {
        let min = self.plugin.min_channel_count().max(1);
        let max = self.plugin.max_channel_count().max(min);
        let plugin_channels = channels.clamp(min, max);

        if plugin_channels != channels {
            log::debug!(
                "ChannelAdapter: '{}' adapting {} input channel(s) to {}",
                self.identifier(),
                channels,
                plugin_channels
            );
        }

        self.plugin.initialise(plugin_channels, step_size, block_size)?;
        self.input_channels = channels;
        self.plugin_channels = plugin_channels;
        self.buffers = vec![vec![0.0; block_size]; plugin_channels];
        Ok(())
    }

    fn reset(&mut self) {
        self.plugin.reset();
    }

    fn outputs(&self) -> Vec<OutputDescriptor> {
        self.plugin.outputs()
    }

    fn process(&mut self, input: &[&[f32]], timestamp: Duration) -> PluginResult<FeatureSet> {
        let frames = input.first().map_or(0, |c| c.len());
        if input.len() == self.plugin_channels {
            return self.plugin.process(input, timestamp);
        }

        for buf in self.buffers.iter_mut() {
            buf.resize(frames, 0.0);
        }

        if input.len() > self.plugin_channels {
            if self.plugin_channels == 1 {
                let scale = 1.0 / input.len() as f32;
                for (i, out) in self.buffers[0].iter_mut().enumerate() {
                    *out = input.iter().map(|c| c.get(i).copied().unwrap_or(0.0)).sum::<f32>() * scale;
                }
            } else {
                for (buf, src) in self.buffers.iter_mut().zip(input) {
                    copy_padded(buf, src);
                }
            }
        } else if input.len() == 1 {
            for buf in self.buffers.iter_mut() {
                copy_padded(buf, input[0]);
            }
        } else {
            for (c, buf) in self.buffers.iter_mut().enumerate() {
                match input.get(c) {
                    Some(src) => copy_padded(buf, src),
                    None => buf.fill(0.0),
                }
            }
        }

        let slices: Vec<&[f32]> = self.buffers.iter().map(|b| b.as_slice()).collect();
        self.plugin.process(&slices, timestamp)
    }

    fn remaining_features(&mut self) -> PluginResult<FeatureSet> {
        self.plugin.remaining_features()
    }
}
