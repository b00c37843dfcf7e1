//! Zero crossing counter

use std::time::Duration;

use crate::plugin::{
    AnalysisPlugin, Feature, FeatureSet, InputDomain, OutputDescriptor, PluginError,
    PluginResult, SampleType,
};
use crate::types::frame_to_time;

pub struct ZeroCrossing {
    sample_rate: u32,
    previous_sample: f32,
    step_size: usize,
}

impl ZeroCrossing {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            previous_sample: 0.0,
            step_size: 0,
        }
    }
}

impl AnalysisPlugin for ZeroCrossing {
    fn identifier(&self) -> &str {
        "zerocrossing"
    }

    fn name(&self) -> &str {
        "Zero Crossings"
    }

    fn description(&self) -> &str {
        "Number and positions of zero crossings in the signal"
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
        InputDomain::Time
    }

    fn initialise(&mut self, channels: usize, step_size: usize, block_size: usize) -> PluginResult<()> {
        if channels != 1 || step_size == 0 || step_size > block_size {
            return Err(PluginError::InitialiseFailed {
                plugin_id: self.identifier().to_string(),
                reason: format!(
                    "expected 1 channel and 0 < step <= block, got {channels}/{step_size}/{block_size}"
                ),
            });
        }
        self.step_size = step_size;
        Ok(())
    }

    fn reset(&mut self) {
        self.previous_sample = 0.0;
    }

    fn outputs(&self) -> Vec<OutputDescriptor> {
        vec![
            OutputDescriptor::new("counts", "Zero Crossing Counts")
                .with_description("Number of zero crossings per processing step")
                .with_unit("crossings")
                .with_quantize_step(1.0),
            OutputDescriptor::new("zerocrossings", "Zero Crossings")
                .with_description("Locations of zero crossings")
                .with_bin_count(Some(0))
                .with_sample_type(SampleType::VariableSampleRate),
        ]
    }

    /// Only the first `step` frames of each block are new, so only they are scanned
    fn process(&mut self, input: &[&[f32]], timestamp: Duration) -> PluginResult<FeatureSet> {
        if self.step_size == 0 {
            return Err(PluginError::NotInitialised {
                plugin_id: self.identifier().to_string(),
            });
        }
        let block = input.first().copied().unwrap_or(&[]);
        let step = self.step_size.min(block.len());

        let mut count = 0usize;
        let mut crossings = Vec::new();
        let mut prev = self.previous_sample;
        for (i, &sample) in block[..step].iter().enumerate() {
            let crossing = if sample <= 0.0 { prev > 0.0 } else { prev <= 0.0 };
            if crossing {
                count += 1;
                crossings.push(Feature::at(
                    timestamp + frame_to_time(i as u64, self.sample_rate),
                    Vec::new(),
                ));
            }
            prev = sample;
        }
        self.previous_sample = prev;

        let mut fs = FeatureSet::new();
        fs.insert(0, vec![Feature::with_values(vec![count as f32])]);
        if !crossings.is_empty() {
            fs.insert(1, crossings);
        }
        Ok(fs)
    }

    fn remaining_features(&mut self) -> PluginResult<FeatureSet> {
        Ok(FeatureSet::new())
    }
}
