//! Block re-chunking adapter
//!
//! Lets the engine feed one fixed block size to every plugin while each
//! plugin still runs at its own step/block geometry. Incoming frames are
//! queued per channel and handed on in overlapping plugin blocks. Outputs
//! the plugin leaves for the host to stamp are stamped here and reported as
//! fixed-rate outputs at `sample_rate / step`.

use std::collections::VecDeque;
use std::time::Duration;

use crate::plugin::{
    merge_feature_sets, AnalysisPlugin, FeatureSet, InputDomain, OutputDescriptor,
    ParameterDescriptor, PluginError, PluginResult, SampleType,
};
use crate::types::{frame_to_time, time_to_frame};

/// Block size used when a plugin states no preference
pub const DEFAULT_PLUGIN_BLOCK_SIZE: usize = 1024;

pub struct BufferingAdapter {
    plugin: Box<dyn AnalysisPlugin>,
    step_size: usize,
    block_size: usize,
    channels: usize,
    queues: Vec<VecDeque<f32>>,
    /// Absolute frame of the first queued sample
    frame: u64,
    /// Absolute frame the next caller block is expected to start at
    next_input_frame: Option<u64>,
    /// Sample types as reported by the wrapped plugin
    inner_sample_types: Vec<SampleType>,
    initialised: bool,
}

impl BufferingAdapter {
    pub fn new(plugin: Box<dyn AnalysisPlugin>) -> Self {
        let block_size = match plugin.preferred_block_size() {
            0 => DEFAULT_PLUGIN_BLOCK_SIZE,
            n => n,
        };
        let step_size = match plugin.preferred_step_size() {
            0 if plugin.input_domain() == InputDomain::Frequency => block_size / 2,
            0 => block_size,
            n => n,
        };
        Self {
            plugin,
            step_size,
            block_size,
            channels: 0,
            queues: Vec::new(),
            frame: 0,
            next_input_frame: None,
            inner_sample_types: Vec::new(),
            initialised: false,
        }
    }

    /// Override the step size the wrapped plugin runs at (before initialise)
    pub fn set_plugin_step_size(&mut self, step_size: usize) {
        if step_size > 0 {
            self.step_size = step_size;
        }
    }

    /// Override the block size the wrapped plugin runs at (before initialise)
    pub fn set_plugin_block_size(&mut self, block_size: usize) {
        if block_size > 0 {
            self.block_size = block_size;
        }
    }

    /// Step and block size the wrapped plugin actually runs at
    pub fn actual_step_and_block_sizes(&self) -> (usize, usize) {
        (self.step_size, self.block_size)
    }

    fn host_stamped(sample_type: SampleType) -> bool {
        matches!(sample_type, SampleType::PerBlock | SampleType::OneSamplePerStep)
    }

    fn stamp(&self, features: &mut FeatureSet, timestamp: Duration) {
        for (output, list) in features.iter_mut() {
            let sample_type = self
                .inner_sample_types
                .get(*output)
                .copied()
                .unwrap_or(SampleType::VariableSampleRate);
            for feature in list.iter_mut() {
                match sample_type {
                    SampleType::PerBlock | SampleType::OneSamplePerStep => {
                        feature.timestamp = Some(timestamp);
                    }
                    SampleType::FixedSampleRate(_) => {
                        feature.timestamp.get_or_insert(timestamp);
                    }
                    SampleType::VariableSampleRate => {}
                }
            }
        }
    }

    /// Hand every complete plugin block in the queues to the plugin
    fn drain_blocks(&mut self, result: &mut FeatureSet) -> PluginResult<()> {
        let rate = self.plugin.input_sample_rate();
        let mut block: Vec<Vec<f32>> = vec![vec![0.0; self.block_size]; self.channels];
        while self.queues.first().map_or(0, |q| q.len()) >= self.block_size {
            for (queue, buf) in self.queues.iter().zip(block.iter_mut()) {
                for (dst, src) in buf.iter_mut().zip(queue.iter()) {
                    *dst = *src;
                }
            }
            let timestamp = frame_to_time(self.frame, rate);
            let slices: Vec<&[f32]> = block.iter().map(|b| b.as_slice()).collect();
            let mut features = self.plugin.process(&slices, timestamp)?;
            self.stamp(&mut features, timestamp);
            merge_feature_sets(result, features);

            for queue in self.queues.iter_mut() {
                queue.drain(..self.step_size.min(queue.len()));
            }
            self.frame += self.step_size as u64;
        }
        Ok(())
    }
}

impl AnalysisPlugin for BufferingAdapter {
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

    fn min_channel_count(&self) -> usize {
        self.plugin.min_channel_count()
    }

    fn max_channel_count(&self) -> usize {
        self.plugin.max_channel_count()
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

    /// `step_size` and `block_size` describe the caller's blocks, which must
    /// not overlap
    fn initialise(&mut self, channels: usize, step_size: usize, block_size: usize) -> PluginResult<()> {
        if step_size != block_size || block_size == 0 {
            return Err(PluginError::InitialiseFailed {
                plugin_id: self.identifier().to_string(),
                reason: format!(
                    "buffered input needs equal non-zero step and block size, got {step_size}/{block_size}"
                ),
            });
        }
        if self.step_size > self.block_size {
            return Err(PluginError::InitialiseFailed {
                plugin_id: self.identifier().to_string(),
                reason: format!(
                    "plugin step size {} exceeds block size {}",
                    self.step_size, self.block_size
                ),
            });
        }

        self.plugin
            .initialise(channels, self.step_size, self.block_size)?;

        self.channels = channels;
        self.queues = vec![VecDeque::with_capacity(self.block_size + block_size); channels];
        self.inner_sample_types = self
            .plugin
            .outputs()
            .iter()
            .map(|o| o.sample_type)
            .collect();
        self.frame = 0;
        self.next_input_frame = None;
        self.initialised = true;
        Ok(())
    }

    fn reset(&mut self) {
        for queue in self.queues.iter_mut() {
            queue.clear();
        }
        self.frame = 0;
        self.next_input_frame = None;
        self.plugin.reset();
    }

    fn outputs(&self) -> Vec<OutputDescriptor> {
        let rate = self.plugin.input_sample_rate() as f32 / self.step_size as f32;
        self.plugin
            .outputs()
            .into_iter()
            .map(|mut output| {
                if Self::host_stamped(output.sample_type) {
                    output.sample_type = SampleType::FixedSampleRate(rate);
                }
                output
            })
            .collect()
    }

    fn process(&mut self, input: &[&[f32]], timestamp: Duration) -> PluginResult<FeatureSet> {
        if !self.initialised {
            return Err(PluginError::NotInitialised {
                plugin_id: self.identifier().to_string(),
            });
        }

        let start = time_to_frame(timestamp, self.plugin.input_sample_rate());
        if self.next_input_frame != Some(start) {
            if self.next_input_frame.is_some() {
                log::debug!(
                    "BufferingAdapter: '{}' input jumped to frame {}, discarding {} buffered frame(s)",
                    self.identifier(),
                    start,
                    self.queues.first().map_or(0, |q| q.len())
                );
            }
            for queue in self.queues.iter_mut() {
                queue.clear();
            }
            self.frame = start;
        }

        let frames = input.first().map_or(0, |c| c.len());
        for (c, queue) in self.queues.iter_mut().enumerate() {
            match input.get(c) {
                Some(samples) => queue.extend(samples.iter().copied()),
                None => queue.extend(std::iter::repeat(0.0).take(frames)),
            }
        }
        self.next_input_frame = Some(start + frames as u64);

        let mut result = FeatureSet::new();
        self.drain_blocks(&mut result)?;
        Ok(result)
    }

    fn remaining_features(&mut self) -> PluginResult<FeatureSet> {
        let mut result = FeatureSet::new();
        self.drain_blocks(&mut result)?;

        // Zero-pad and process whatever is left over
        let leftover = self.queues.first().map_or(0, |q| q.len());
        if leftover > 0 {
            for queue in self.queues.iter_mut() {
                queue.resize(self.block_size, 0.0);
            }
            self.drain_blocks(&mut result)?;
            for queue in self.queues.iter_mut() {
                queue.clear();
            }
        }

        let timestamp = frame_to_time(self.frame, self.plugin.input_sample_rate());
        let mut features = self.plugin.remaining_features()?;
        self.stamp(&mut features, timestamp);
        merge_feature_sets(&mut result, features);
        self.next_input_frame = None;
        Ok(result)
    }
}
