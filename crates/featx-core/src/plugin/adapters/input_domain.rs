//! Time-to-frequency domain adapter
//!
//! Presents a frequency-domain plugin as a time-domain one: each block is
//! windowed, rotated so the window centre sits at index 0, and transformed
//! with a real FFT. The plugin receives `block + 2` floats per channel (re/im
//! pairs for bins `0..=block/2`) and a timestamp pointing at the block centre.

use std::sync::Arc;
use std::time::Duration;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use super::window::Window;
use crate::plugin::{
    AnalysisPlugin, FeatureSet, InputDomain, OutputDescriptor, ParameterDescriptor, PluginError,
    PluginResult,
};
use crate::transform::WindowType;
use crate::types::frame_to_time;

/// Block size used when a frequency-domain plugin states no preference
pub const DEFAULT_FREQUENCY_BLOCK_SIZE: usize = 1024;

struct FftState {
    fft: Arc<dyn RealToComplex<f32>>,
    window: Window,
    frame: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    /// One interleaved re/im buffer per channel
    channels: Vec<Vec<f32>>,
}

/// Wraps a frequency-domain plugin so it accepts time-domain blocks
pub struct InputDomainAdapter {
    plugin: Box<dyn AnalysisPlugin>,
    window_type: WindowType,
    block_size: usize,
    state: Option<FftState>,
}

impl InputDomainAdapter {
    pub fn new(plugin: Box<dyn AnalysisPlugin>) -> Self {
        Self {
            plugin,
            window_type: WindowType::default(),
            block_size: 0,
            state: None,
        }
    }

    /// Window shape applied before the FFT (takes effect at initialise)
    pub fn set_window_type(&mut self, window_type: WindowType) {
        self.window_type = window_type;
    }

    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    /// Shift applied to timestamps handed to the wrapped plugin
    pub fn timestamp_adjustment(&self) -> Duration {
        frame_to_time((self.block_size / 2) as u64, self.plugin.input_sample_rate())
    }
}

impl AnalysisPlugin for InputDomainAdapter {
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
        InputDomain::Time
    }

    fn preferred_block_size(&self) -> usize {
        match self.plugin.preferred_block_size() {
            0 => DEFAULT_FREQUENCY_BLOCK_SIZE,
            n => n,
        }
    }

    fn preferred_step_size(&self) -> usize {
        match self.plugin.preferred_step_size() {
            0 => self.preferred_block_size() / 2,
            n => n,
        }
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

    fn initialise(&mut self, channels: usize, step_size: usize, block_size: usize) -> PluginResult<()> {
        if block_size < 2 || block_size % 2 != 0 {
            return Err(PluginError::InitialiseFailed {
                plugin_id: self.identifier().to_string(),
                reason: format!("frequency-domain block size must be even, got {block_size}"),
            });
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(block_size);
        self.state = Some(FftState {
            window: Window::new(self.window_type, block_size),
            frame: fft.make_input_vec(),
            spectrum: fft.make_output_vec(),
            scratch: fft.make_scratch_vec(),
            channels: vec![vec![0.0; block_size + 2]; channels],
            fft,
        });
        self.block_size = block_size;

        log::debug!(
            "InputDomainAdapter: '{}' using {:?} window, block {}, step {}",
            self.identifier(),
            self.window_type,
            block_size,
            step_size
        );

        self.plugin.initialise(channels, step_size, block_size)
    }

    fn reset(&mut self) {
        self.plugin.reset();
    }

    fn outputs(&self) -> Vec<OutputDescriptor> {
        self.plugin.outputs()
    }

    fn process(&mut self, input: &[&[f32]], timestamp: Duration) -> PluginResult<FeatureSet> {
        let plugin_id = self.plugin.identifier().to_string();
        let shift = self.timestamp_adjustment();
        let state = self
            .state
            .as_mut()
            .ok_or(PluginError::NotInitialised { plugin_id: plugin_id.clone() })?;
        let block = self.block_size;
        let half = block / 2;

        for (c, out) in state.channels.iter_mut().enumerate() {
            let samples = input.get(c).copied().unwrap_or(&[]);
            for (i, s) in state.frame.iter_mut().enumerate() {
                *s = samples.get(i).copied().unwrap_or(0.0);
            }
            state.window.cut(&mut state.frame);
            // Centre the window on index 0 so bin phases are relative to the block centre
            state.frame.rotate_left(half);

            state
                .fft
                .process_with_scratch(&mut state.frame, &mut state.spectrum, &mut state.scratch)
                .map_err(|e| PluginError::ProcessingError {
                    plugin_id: plugin_id.clone(),
                    reason: format!("FFT failed: {:?}", e),
                })?;

            for (bin, value) in state.spectrum.iter().enumerate() {
                out[bin * 2] = value.re;
                out[bin * 2 + 1] = value.im;
            }
        }

        let slices: Vec<&[f32]> = state.channels.iter().map(|c| c.as_slice()).collect();
        self.plugin.process(&slices, timestamp + shift)
    }

    fn remaining_features(&mut self) -> PluginResult<FeatureSet> {
        self.plugin.remaining_features()
    }
}
