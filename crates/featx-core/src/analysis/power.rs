//! RMS and peak level per block

use std::time::Duration;

use crate::plugin::{
    AnalysisPlugin, Feature, FeatureSet, InputDomain, OutputDescriptor, ParameterDescriptor,
    PluginError, PluginResult,
};

/// Level reported for digital silence when output is in decibels
const DB_FLOOR: f32 = -120.0;

pub struct Power {
    sample_rate: u32,
    decibels: bool,
    initialised: bool,
}

impl Power {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            decibels: false,
            initialised: false,
        }
    }

    fn level(&self, linear: f32) -> f32 {
        if !self.decibels {
            return linear;
        }
        if linear <= 0.0 {
            DB_FLOOR
        } else {
            (20.0 * linear.log10()).max(DB_FLOOR)
        }
    }
}

impl AnalysisPlugin for Power {
    fn identifier(&self) -> &str {
        "power"
    }

    fn name(&self) -> &str {
        "Power"
    }

    fn description(&self) -> &str {
        "RMS and peak level of each processing block"
    }

    fn maker(&self) -> &str {
        "featx"
    }

    fn version(&self) -> u32 {
        1
    }

    fn input_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn input_domain(&self) -> InputDomain {
        InputDomain::Time
    }

    fn preferred_block_size(&self) -> usize {
        1024
    }

    fn parameter_descriptors(&self) -> Vec<ParameterDescriptor> {
        vec![ParameterDescriptor::new("db", "Decibels", 0.0)
            .with_range(0.0, 1.0)
            .with_quantize_step(1.0)]
    }

    fn parameter(&self, identifier: &str) -> Option<f32> {
        match identifier {
            "db" => Some(if self.decibels { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn set_parameter(&mut self, identifier: &str, value: f32) -> PluginResult<()> {
        match identifier {
            "db" => {
                self.decibels = value >= 0.5;
                Ok(())
            }
            _ => Err(PluginError::UnknownParameter {
                plugin_id: self.identifier().to_string(),
                parameter: identifier.to_string(),
            }),
        }
    }

    fn initialise(&mut self, channels: usize, _step_size: usize, block_size: usize) -> PluginResult<()> {
        if channels != 1 || block_size == 0 {
            return Err(PluginError::InitialiseFailed {
                plugin_id: self.identifier().to_string(),
                reason: format!("expected 1 channel and a non-empty block, got {channels}/{block_size}"),
            });
        }
        self.initialised = true;
        Ok(())
    }

    fn reset(&mut self) {}

    fn outputs(&self) -> Vec<OutputDescriptor> {
        let unit = if self.decibels { "dB" } else { "" };
        vec![
            OutputDescriptor::new("rms", "RMS Level")
                .with_description("Root mean square level of the block")
                .with_unit(unit),
            OutputDescriptor::new("peak", "Peak Level")
                .with_description("Largest absolute sample value in the block")
                .with_unit(unit),
        ]
    }

    fn process(&mut self, input: &[&[f32]], _timestamp: Duration) -> PluginResult<FeatureSet> {
        if !self.initialised {
            return Err(PluginError::NotInitialised {
                plugin_id: self.identifier().to_string(),
            });
        }
        let block = input.first().copied().unwrap_or(&[]);
        let (sum_sq, peak) = block
            .iter()
            .fold((0.0f64, 0.0f32), |(s, p), &x| (s + (x as f64) * (x as f64), p.max(x.abs())));
        let rms = if block.is_empty() {
            0.0
        } else {
            (sum_sq / block.len() as f64).sqrt() as f32
        };

        let mut fs = FeatureSet::new();
        fs.insert(0, vec![Feature::with_values(vec![self.level(rms)])]);
        fs.insert(1, vec![Feature::with_values(vec![self.level(peak)])]);
        Ok(fs)
    }

    fn remaining_features(&mut self) -> PluginResult<FeatureSet> {
        Ok(FeatureSet::new())
    }
}
