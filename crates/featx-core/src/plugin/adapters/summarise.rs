//! Statistical summary adapter
//!
//! Sits outermost in every instance's adapter chain. Until
//! [`SummarisingAdapter::enable`] is called it is a pure passthrough; once
//! enabled it records every feature that passes through and can produce one
//! aggregated feature per output (per segment) for any [`SummaryType`].
//!
//! Mean, variance, standard deviation and mode are continuous-time weighted:
//! each feature counts for its duration, which is its explicit duration if
//! it has one, else the gap to the next feature, else the gap to the end of
//! its segment. Minimum, maximum, median, sum and count are unweighted.

use std::time::Duration;

use crate::plugin::{
    AnalysisPlugin, Feature, FeatureSet, InputDomain, OutputDescriptor, ParameterDescriptor,
    PluginResult,
};
use crate::transform::SummaryType;
use crate::types::frame_to_time;

#[derive(Debug, Clone)]
struct Recorded {
    timestamp: Duration,
    duration: Option<Duration>,
    values: Vec<f32>,
}

pub struct SummarisingAdapter {
    plugin: Box<dyn AnalysisPlugin>,
    enabled: bool,
    boundaries: Vec<Duration>,
    block_size: usize,
    /// Recorded features per output index
    recorded: Vec<Vec<Recorded>>,
    /// End of the last block seen
    end_time: Duration,
}

impl SummarisingAdapter {
    /// Wrap `plugin` with summarisation disabled
    pub fn new(plugin: Box<dyn AnalysisPlugin>) -> Self {
        Self {
            plugin,
            enabled: false,
            boundaries: Vec::new(),
            block_size: 0,
            recorded: Vec::new(),
            end_time: Duration::ZERO,
        }
    }

    /// Whether this instance records features for summaries
    pub fn is_summarising(&self) -> bool {
        self.enabled
    }

    /// Start recording features, summarising over the given segment boundaries
    pub fn enable(&mut self, boundaries: &[Duration]) {
        self.enabled = true;
        self.set_segment_boundaries(boundaries);
    }

    pub fn set_segment_boundaries(&mut self, boundaries: &[Duration]) {
        let mut b: Vec<Duration> = boundaries.iter().copied().filter(|t| !t.is_zero()).collect();
        b.sort();
        b.dedup();
        self.boundaries = b;
    }

    fn record(&mut self, features: &FeatureSet, fallback: Duration) {
        for (&output, list) in features {
            if self.recorded.len() <= output {
                self.recorded.resize_with(output + 1, Vec::new);
            }
            for feature in list {
                let timestamp = feature.timestamp.unwrap_or(fallback);
                if let Some(end) = feature.duration.map(|d| timestamp + d) {
                    self.end_time = self.end_time.max(end);
                }
                self.end_time = self.end_time.max(timestamp);
                self.recorded[output].push(Recorded {
                    timestamp,
                    duration: feature.duration,
                    values: feature.values.clone(),
                });
            }
        }
    }

    /// Intervals to summarise over, clipped to `[from, to)`
    ///
    /// `to` defaults to the end of the recorded stream. Boundaries inside the
    /// range split it; the first interval always starts at `from`.
    fn segments(&self, from: Duration, to: Option<Duration>) -> Vec<(Duration, Duration)> {
        let to = to.map_or(self.end_time, |t| t.min(self.end_time));
        let mut starts = vec![from];
        starts.extend(self.boundaries.iter().copied().filter(|b| *b > from && *b < to));
        let mut segments = Vec::with_capacity(starts.len());
        for (i, start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(to);
            segments.push((*start, end.max(*start)));
        }
        segments
    }

    /// One summary feature per segment, for every output that produced features
    pub fn summary_for_all_outputs(&self, kind: SummaryType) -> FeatureSet {
        self.summary_within(kind, Duration::ZERO, None)
    }

    /// Like [`Self::summary_for_all_outputs`], restricted to features
    /// timestamped inside `[from, to)`
    ///
    /// Segments start at `from` and end at `to` (or the end of the stream),
    /// so a windowed transform never sees a summary from outside its window.
    pub fn summary_within(&self, kind: SummaryType, from: Duration, to: Option<Duration>) -> FeatureSet {
        let mut result = FeatureSet::new();
        if kind.is_none() {
            return result;
        }
        let segments = self.segments(from, to);
        for (output, recorded) in self.recorded.iter().enumerate() {
            if recorded.is_empty() {
                continue;
            }
            let mut sorted = recorded.clone();
            sorted.sort_by_key(|r| r.timestamp);

            let mut summaries = Vec::new();
            for &(start, end) in &segments {
                if let Some(feature) = summarise_segment(&sorted, start, end, kind) {
                    summaries.push(feature);
                }
            }
            if !summaries.is_empty() {
                result.insert(output, summaries);
            }
        }
        result
    }
}

/// Aggregate the features starting inside `[start, end)`
fn summarise_segment(
    sorted: &[Recorded],
    start: Duration,
    end: Duration,
    kind: SummaryType,
) -> Option<Feature> {
    let in_segment: Vec<(usize, &Recorded)> = sorted
        .iter()
        .enumerate()
        .filter(|(_, r)| r.timestamp >= start && (r.timestamp < end || (end == start && r.timestamp == end)))
        .collect();
    if in_segment.is_empty() {
        return None;
    }

    let weights: Vec<f64> = in_segment
        .iter()
        .map(|(i, r)| {
            let natural = r.duration.or_else(|| {
                sorted
                    .get(i + 1)
                    .map(|next| next.timestamp.saturating_sub(r.timestamp))
            });
            let limit = end.saturating_sub(r.timestamp);
            natural.unwrap_or(limit).min(limit).as_secs_f64()
        })
        .collect();

    let bins = in_segment.iter().map(|(_, r)| r.values.len()).max().unwrap_or(0);
    let values = (0..bins)
        .map(|bin| {
            let samples: Vec<(f64, f64)> = in_segment
                .iter()
                .zip(&weights)
                .filter_map(|((_, r), w)| r.values.get(bin).map(|v| (*v as f64, *w)))
                .collect();
            summarise_bin(&samples, kind) as f32
        })
        .collect();

    Some(Feature {
        timestamp: Some(start),
        duration: Some(end.saturating_sub(start)),
        values,
        label: String::new(),
    })
}

/// Summarise `(value, weight)` pairs of one bin
fn summarise_bin(samples: &[(f64, f64)], kind: SummaryType) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f64;
    let total_weight: f64 = samples.iter().map(|(_, w)| w).sum();
    let weighted = total_weight > 0.0;
    let weight = |w: f64| if weighted { w } else { 1.0 };
    let denom = if weighted { total_weight } else { n };

    let mean = samples.iter().map(|(v, w)| v * weight(*w)).sum::<f64>() / denom;
    let variance = samples
        .iter()
        .map(|(v, w)| (v - mean) * (v - mean) * weight(*w))
        .sum::<f64>()
        / denom;

    match kind {
        SummaryType::Minimum => samples.iter().map(|(v, _)| *v).fold(f64::INFINITY, f64::min),
        SummaryType::Maximum => samples.iter().map(|(v, _)| *v).fold(f64::NEG_INFINITY, f64::max),
        SummaryType::Sum => samples.iter().map(|(v, _)| v).sum(),
        SummaryType::Count => n,
        SummaryType::Mean => mean,
        SummaryType::Variance => variance,
        SummaryType::StandardDeviation => variance.sqrt(),
        SummaryType::Median => {
            let mut sorted: Vec<f64> = samples.iter().map(|(v, _)| *v).collect();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        }
        SummaryType::Mode => {
            // Value with the largest total weight; ties go to the smallest value
            let mut by_value: Vec<(f64, f64)> = Vec::new();
            let mut sorted: Vec<(f64, f64)> = samples.to_vec();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
            for (v, w) in sorted {
                match by_value.last_mut() {
                    Some((last, acc)) if *last == v => *acc += weight(w),
                    _ => by_value.push((v, weight(w))),
                }
            }
            by_value
                .iter()
                .fold(None::<(f64, f64)>, |best, &(v, w)| match best {
                    Some((_, bw)) if bw >= w => best,
                    _ => Some((v, w)),
                })
                .map_or(0.0, |(v, _)| v)
        }
        SummaryType::None => 0.0,
    }
}

impl AnalysisPlugin for SummarisingAdapter {
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
        self.block_size = block_size;
        self.plugin.initialise(channels, step_size, block_size)
    }

    fn reset(&mut self) {
        self.recorded.clear();
        self.end_time = Duration::ZERO;
        self.plugin.reset();
    }

    fn outputs(&self) -> Vec<OutputDescriptor> {
        self.plugin.outputs()
    }

    fn process(&mut self, input: &[&[f32]], timestamp: Duration) -> PluginResult<FeatureSet> {
        let features = self.plugin.process(input, timestamp)?;
        if self.enabled {
            let block_end =
                timestamp + frame_to_time(self.block_size as u64, self.plugin.input_sample_rate());
            self.end_time = self.end_time.max(block_end);
            self.record(&features, timestamp);
        }
        Ok(features)
    }

    fn remaining_features(&mut self) -> PluginResult<FeatureSet> {
        let features = self.plugin.remaining_features()?;
        if self.enabled {
            let end = self.end_time;
            self.record(&features, end);
        }
        Ok(features)
    }
}
