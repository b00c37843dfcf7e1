//! Spectral centroid on linear and logarithmic frequency scales

use std::time::Duration;

use crate::plugin::{
    AnalysisPlugin, Feature, FeatureSet, InputDomain, OutputDescriptor, PluginError,
    PluginResult,
};

pub struct SpectralCentroid {
    sample_rate: u32,
    block_size: usize,
}

impl SpectralCentroid {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            block_size: 0,
        }
    }
}

impl AnalysisPlugin for SpectralCentroid {
    fn identifier(&self) -> &str {
        "spectralcentroid"
    }

    fn name(&self) -> &str {
        "Spectral Centroid"
    }

    fn description(&self) -> &str {
        "Centre of gravity of the magnitude spectrum"
    }

    fn maker(&self) -> &str {
        "featx"
    }

    fn version(&self) -> u32 {
        2
    }

    fn input_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn input_domain(&self) -> InputDomain {
        InputDomain::Frequency
    }

    fn preferred_block_size(&self) -> usize {
        2048
    }

    fn initialise(&mut self, channels: usize, _step_size: usize, block_size: usize) -> PluginResult<()> {
        if channels != 1 || block_size < 2 {
            return Err(PluginError::InitialiseFailed {
                plugin_id: self.identifier().to_string(),
                reason: format!("expected 1 channel and block >= 2, got {channels}/{block_size}"),
            });
        }
        self.block_size = block_size;
        Ok(())
    }

    fn reset(&mut self) {}

    fn outputs(&self) -> Vec<OutputDescriptor> {
        vec![
            OutputDescriptor::new("logcentroid", "Log Frequency Centroid")
                .with_description("Centroid of the log weighted frequency spectrum")
                .with_unit("Hz"),
            OutputDescriptor::new("linearcentroid", "Linear Frequency Centroid")
                .with_description("Centroid of the linear frequency spectrum")
                .with_unit("Hz"),
        ]
    }

    fn process(&mut self, input: &[&[f32]], _timestamp: Duration) -> PluginResult<FeatureSet> {
        if self.block_size == 0 {
            return Err(PluginError::NotInitialised {
                plugin_id: self.identifier().to_string(),
            });
        }
        let spectrum = input.first().copied().unwrap_or(&[]);
        let half = self.block_size / 2;

        let (mut num_lin, mut num_log, mut denom) = (0.0f64, 0.0f64, 0.0f64);
        for bin in 1..=half {
            let (Some(&re), Some(&im)) = (spectrum.get(bin * 2), spectrum.get(bin * 2 + 1)) else {
                break;
            };
            let freq = bin as f64 * self.sample_rate as f64 / self.block_size as f64;
            let mag = ((re as f64).powi(2) + (im as f64).powi(2)).sqrt() / half as f64;
            num_lin += freq * mag;
            num_log += freq.log10() * mag;
            denom += mag;
        }

        let mut fs = FeatureSet::new();
        if denom > 0.0 {
            let linear = num_lin / denom;
            let log = 10f64.powf(num_log / denom);
            if linear.is_finite() && log.is_finite() {
                fs.insert(0, vec![Feature::with_values(vec![log as f32])]);
                fs.insert(1, vec![Feature::with_values(vec![linear as f32])]);
            }
        }
        Ok(fs)
    }

    fn remaining_features(&mut self) -> PluginResult<FeatureSet> {
        Ok(FeatureSet::new())
    }
}
