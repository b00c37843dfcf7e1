//! Dispatching feature sets to the transforms (and writers) that asked for them

use std::collections::BTreeSet;
use std::time::Duration;

use super::{ExtractionError, PluginInstance};
use crate::plugin::{Feature, FeatureSet};
use crate::transform::{SummaryType, Transform};
use crate::types::time_to_frame;

/// Time window of one transform over one source, in frames and in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TransformWindow {
    pub start_frame: u64,
    pub end_frame: u64,
    start_time: Duration,
    end_time: Option<Duration>,
}

impl TransformWindow {
    /// A zero duration runs to the end of the source
    pub fn new(transform: &Transform, sample_rate: u32, frame_count: u64) -> Self {
        let start_frame = time_to_frame(transform.start_time, sample_rate);
        let (end_frame, end_time) = if transform.duration.is_zero() {
            (frame_count, None)
        } else {
            let frames = time_to_frame(transform.duration, sample_rate);
            (
                start_frame.saturating_add(frames).min(frame_count),
                Some(transform.start_time + transform.duration),
            )
        };
        Self {
            start_frame,
            end_frame,
            start_time: transform.start_time,
            end_time,
        }
    }

    /// Window bounds in time; `None` runs to the end of the source
    pub fn span(&self) -> (Duration, Option<Duration>) {
        (self.start_time, self.end_time)
    }

    /// Whether the window intersects the block `[frame, frame + block_size)`
    pub fn overlaps(&self, frame: u64, block_size: usize) -> bool {
        self.start_frame < frame + block_size as u64 && self.end_frame > frame
    }

    /// Whether a feature's timestamp lies inside the window
    fn admits(&self, feature: &Feature) -> bool {
        let Some(t) = feature.timestamp else {
            return true;
        };
        if !self.start_time.is_zero() && t < self.start_time {
            return false;
        }
        !matches!(self.end_time, Some(end) if t >= end)
    }
}

/// Whether features of summary kind `kind` go to `transform`
///
/// A transform naming a summary receives only that kind. One naming none
/// receives raw features, plus every run-level kind.
pub(crate) fn summary_matches(
    transform: &Transform,
    kind: SummaryType,
    run_kinds: &BTreeSet<SummaryType>,
) -> bool {
    transform.summary == kind
        || (transform.summary.is_none() && !kind.is_none() && run_kinds.contains(&kind))
}

/// Send `features` produced by `instance` to its matching transforms
///
/// `gate` marks, per transform of the work list, whether it is in range for
/// the current block (`None` routes to all). Raw features outside a
/// transform's window are dropped; summaries are not time-filtered.
pub(crate) fn route(
    source_id: &str,
    instance: &PluginInstance,
    features: &FeatureSet,
    kind: SummaryType,
    run_kinds: &BTreeSet<SummaryType>,
    gate: Option<&[bool]>,
    windows: &[TransformWindow],
) -> Result<(), ExtractionError> {
    for (i, work) in instance.work.iter().enumerate() {
        if gate.is_some_and(|g| !g.get(i).copied().unwrap_or(false)) {
            continue;
        }
        let transform = &work.transform;
        if !summary_matches(transform, kind, run_kinds) {
            continue;
        }

        let Some(index) = instance.output_index(&transform.output) else {
            log::warn!(
                "Nonexistent plugin output '{}' requested for transform '{}', ignoring it",
                transform.output,
                transform.plugin_id
            );
            continue;
        };
        let Some(list) = features.get(&index) else {
            continue;
        };

        let filtered: Vec<Feature>;
        let list: &[Feature] = match windows.get(i) {
            Some(window) if kind.is_none() => {
                filtered = list.iter().filter(|f| window.admits(f)).cloned().collect();
                &filtered
            }
            _ => list,
        };
        if list.is_empty() {
            continue;
        }

        let descriptor = &instance.outputs[index];
        for writer in &work.writers {
            writer
                .borrow_mut()
                .write(source_id, transform, descriptor, list, kind.name())
                .map_err(|source| ExtractionError::Writer {
                    source_id: source_id.to_string(),
                    source,
                })?;
        }
    }
    Ok(())
}
