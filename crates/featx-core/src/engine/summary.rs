//! Summary pass: runs after draining, once per instance and summary kind

use std::collections::BTreeSet;
use std::time::Duration;

use super::router::{route, TransformWindow};
use super::{ExtractionError, PluginInstance};
use crate::plugin::AnalysisPlugin;
use crate::transform::SummaryType;

/// Route every summary kind `instance` owes its transforms
///
/// Kinds are the run-level ones plus those named by the instance's own
/// transforms, each produced over the transforms' window (the whole source
/// unless a start or duration is set), whole or per segment. Transforms
/// sharing an instance share their window.
pub(crate) fn write_summaries(
    source_id: &str,
    instance: &PluginInstance,
    run_kinds: &BTreeSet<SummaryType>,
    windows: &[TransformWindow],
) -> Result<(), ExtractionError> {
    let kinds = instance.summary_kinds(run_kinds);
    if kinds.is_empty() {
        return Ok(());
    }
    if !instance.plugin.is_summarising() {
        log::warn!(
            "Summaries requested, but plugin '{}' is not summarising; skipping its summaries for '{}'",
            instance.plugin.identifier(),
            source_id
        );
        return Ok(());
    }

    let (from, to) = windows
        .first()
        .map_or((Duration::ZERO, None), TransformWindow::span);
    for kind in kinds {
        let summaries = instance.plugin.summary_within(kind, from, to);
        log::debug!(
            "{} summary of {} output(s) for '{}'",
            kind,
            summaries.len(),
            source_id
        );
        route(source_id, instance, &summaries, kind, run_kinds, None, windows)?;
    }
    Ok(())
}
