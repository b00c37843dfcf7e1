//! Source queueing and the per-source extraction loop
//!
//! Each source goes through: open at the run rate, reset every instance,
//! compute transform windows, process blocks, drain, summarise. Features
//! reach writers in block order per instance, drained features after all
//! block features, summaries last.

use super::feed::ChannelFeed;
use super::router::{route, TransformWindow};
use super::summary::write_summaries;
use super::{ExtractionError, ExtractionManager, PendingSource, SourceSpec};
use crate::audio::{AudioSource, MultiplexedSource, SourceError, SourceResult};
use crate::plugin::AnalysisPlugin;
use crate::transform::SummaryType;
use crate::types::frame_to_time;
use crate::writer::TrackMetadata;

/// Outcome of [`ExtractionManager::run`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Sources extracted completely, in extraction order
    pub completed: Vec<String>,
    /// Sources that failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl RunReport {
    /// True when every source completed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl ExtractionManager {
    /// Rate sources are opened at before extraction: the run rate, else the
    /// default rate, else native
    fn requested_rate(&self) -> Option<u32> {
        match (self.sample_rate, self.default_sample_rate) {
            (0, 0) => None,
            (0, default) => Some(default),
            (rate, _) => Some(rate),
        }
    }

    fn open_spec(&self, spec: &SourceSpec, rate: Option<u32>) -> SourceResult<Box<dyn AudioSource>> {
        match spec {
            SourceSpec::Single(id) => self.provider.open(id, rate),
            SourceSpec::Multiplexed(ids) => {
                let mut inputs = Vec::with_capacity(ids.len());
                let mut rate = rate;
                for id in ids {
                    let input = self.provider.open(id, rate)?;
                    // Later inputs follow the first one's rate
                    rate.get_or_insert(input.sample_rate());
                    inputs.push(input);
                }
                Ok(Box::new(MultiplexedSource::new(inputs, ids)?))
            }
        }
    }

    /// Check a source ahead of extraction and queue it
    ///
    /// The source is only decoded when its extraction starts, and released
    /// before the next one. With no rate established yet it is opened now
    /// instead, its own rate becomes the default sample rate and it stays
    /// open until extracted.
    ///
    /// # Arguments
    ///
    /// * `source_id` - Identifier handed to the source provider, usually a path
    ///
    /// # Example
    ///
    /// ```ignore
    /// manager.add_source("tracks/intro.flac")?;
    /// manager.add_source("file:///music/outro.wav")?;
    /// assert_eq!(manager.source_ids().len(), 2);
    /// ```
    pub fn add_source(&mut self, source_id: &str) -> Result<(), SourceError> {
        let spec = SourceSpec::Single(source_id.to_string());
        self.queue_source(source_id.to_string(), spec)
    }

    /// Queue several sources read as one, each contributing one channel
    ///
    /// The channel count follows the number of inputs unless transforms are
    /// already registered. The group is identified by its first input.
    pub fn add_multiplexed_source(&mut self, source_ids: &[String]) -> Result<(), SourceError> {
        let first = source_ids.first().ok_or(SourceError::EmptyMultiplex)?.clone();
        self.queue_source(first, SourceSpec::Multiplexed(source_ids.to_vec()))?;

        if self.set_channels(source_ids.len()).is_err() {
            log::warn!(
                "Multiplexing {} sources, but the channel count is already fixed at {}",
                source_ids.len(),
                self.channels
            );
        }
        Ok(())
    }

    fn queue_source(&mut self, id: String, spec: SourceSpec) -> Result<(), SourceError> {
        if self.requested_rate().is_some() {
            let inputs = match &spec {
                SourceSpec::Single(source_id) => std::slice::from_ref(source_id),
                SourceSpec::Multiplexed(ids) => ids.as_slice(),
            };
            for input in inputs {
                self.provider.check(input)?;
            }
            log::info!("Added source '{}'", id);
            self.sources.push(PendingSource {
                id,
                spec,
                ready: None,
            });
            return Ok(());
        }

        let source = self.open_spec(&spec, None)?;
        log::info!(
            "Using sample rate of {} Hz from '{}' as the default",
            source.sample_rate(),
            id
        );
        self.default_sample_rate = source.sample_rate();
        log::info!(
            "Added {}-channel source '{}' ({} Hz, {} frames)",
            source.channel_count(),
            id,
            source.sample_rate(),
            source.frame_count()
        );
        self.sources.push(PendingSource {
            id,
            spec,
            ready: Some(source),
        });
        Ok(())
    }

    /// Extract every queued source, then finalise every writer once
    ///
    /// Failing sources abort the run unless continue-on-error is set; writers
    /// are finalised either way. Writer failures and internal inconsistencies
    /// always abort.
    ///
    /// # Errors
    ///
    /// * [`ExtractionError::NoTransforms`] when nothing is registered
    /// * The first source failure, unless continue-on-error is set
    /// * [`ExtractionError::Writer`], [`ExtractionError::RateInconsistency`]
    ///   and [`ExtractionError::Finalise`] regardless of continue-on-error
    pub fn run(&mut self) -> Result<RunReport, ExtractionError> {
        if self.instances.is_empty() {
            return Err(ExtractionError::NoTransforms);
        }

        let mut report = RunReport::default();
        let mut abort = None;
        for pending in std::mem::take(&mut self.sources) {
            let id = pending.id.clone();
            match self.extract_source(pending) {
                Ok(()) => report.completed.push(id),
                Err(e) => {
                    log::error!("Failed to extract features from '{}': {}", id, e);
                    report.failed.push((id, e.to_string()));
                    if !self.continue_on_error || e.aborts_run() {
                        abort = Some(e);
                        break;
                    }
                }
            }
        }

        let finished = self.finish_writers();
        if let Some(e) = abort {
            return Err(e);
        }
        finished?;

        log::info!(
            "Extraction finished: {} source(s) completed, {} failed",
            report.completed.len(),
            report.failed.len()
        );
        Ok(report)
    }

    fn extract_source(&mut self, pending: PendingSource) -> Result<(), ExtractionError> {
        let PendingSource { id, spec, ready } = pending;
        let rate = self.sample_rate;

        // A stale source is released before its replacement is decoded
        let source = match ready.filter(|source| source.sample_rate() == rate) {
            Some(source) => source,
            None => {
                log::info!("Opening '{}' at {} Hz", id, rate);
                self.open_spec(&spec, Some(rate))?
            }
        };
        if source.sample_rate() != rate {
            return Err(ExtractionError::RateInconsistency {
                source_id: id,
                expected: rate,
                found: source.sample_rate(),
            });
        }
        if source.channel_count() < self.channels {
            return Err(SourceError::TooFewChannels {
                source_id: id,
                channels: source.channel_count(),
                required: self.channels,
            }
            .into());
        }

        let writers = self.distinct_writers();
        for writer in &writers {
            writer
                .borrow_mut()
                .test_output(&id)
                .map_err(|e| SourceError::WriterRejected {
                    source_id: id.clone(),
                    reason: e.to_string(),
                })?;
        }

        log::info!("Extracting features from '{}'", id);
        for instance in self.instances.iter_mut() {
            instance.plugin.reset();
        }

        let frame_count = source.frame_count();
        let windows: Vec<Vec<TransformWindow>> = self
            .instances
            .iter()
            .map(|instance| {
                instance
                    .work
                    .iter()
                    .map(|w| TransformWindow::new(&w.transform, rate, frame_count))
                    .collect()
            })
            .collect();
        let start = windows.iter().flatten().map(|w| w.start_frame).min().unwrap_or(0);
        let end = windows
            .iter()
            .flatten()
            .map(|w| w.end_frame)
            .max()
            .unwrap_or(frame_count);

        let metadata = TrackMetadata {
            title: source.title().to_string(),
            maker: source.maker().to_string(),
            duration: source.duration(),
        };
        for writer in &writers {
            writer
                .borrow_mut()
                .set_track_metadata(&id, &metadata)
                .map_err(|source| ExtractionError::Writer {
                    source_id: id.clone(),
                    source,
                })?;
        }

        let run_kinds = self.summaries.clone();
        let direct = !self.summaries_only;
        let block_size = self.block_size;
        let mut feed = ChannelFeed::new(self.channels, block_size);
        let mut progress = 0;

        let mut frame = start;
        while frame < end {
            feed.fill(source.as_ref(), frame);
            let slices = feed.slices();
            let timestamp = frame_to_time(frame, rate);

            for (instance, windows) in self.instances.iter_mut().zip(&windows) {
                let gate: Vec<bool> = windows.iter().map(|w| w.overlaps(frame, block_size)).collect();
                if !gate.contains(&true) {
                    continue;
                }
                let features = instance.plugin.process(&slices, timestamp).map_err(|source| {
                    ExtractionError::Plugin {
                        plugin_id: instance.plugin.identifier().to_string(),
                        source_id: id.clone(),
                        source,
                    }
                })?;
                if direct {
                    route(&id, instance, &features, SummaryType::None, &run_kinds, Some(&gate), windows)?;
                }
            }

            let percent = ((frame - start) as f64 * 100.0 / (end - start) as f64 + 0.1) as u32;
            if percent > progress {
                progress = percent;
                log::debug!("'{}': {}%", id, percent);
                if let Some(callback) = self.progress.as_mut() {
                    callback(&id, percent);
                }
            }
            frame += block_size as u64;
        }

        for (instance, windows) in self.instances.iter_mut().zip(&windows) {
            let features = instance.plugin.remaining_features().map_err(|source| {
                ExtractionError::Plugin {
                    plugin_id: instance.plugin.identifier().to_string(),
                    source_id: id.clone(),
                    source,
                }
            })?;
            if direct {
                route(&id, instance, &features, SummaryType::None, &run_kinds, None, windows)?;
            }
        }

        for (instance, windows) in self.instances.iter().zip(&windows) {
            write_summaries(&id, instance, &run_kinds, windows)?;
        }

        if let Some(callback) = self.progress.as_mut() {
            callback(&id, 100);
        }
        log::info!(
            "Finished '{}' ({:.3} s of audio)",
            id,
            frame_to_time(end.saturating_sub(start), rate).as_secs_f64()
        );
        Ok(())
    }

    /// Flush and finish every distinct writer exactly once
    fn finish_writers(&mut self) -> Result<(), ExtractionError> {
        let mut first_error = None;
        for writer in self.distinct_writers() {
            let mut writer = writer.borrow_mut();
            let result = writer.flush().and_then(|()| writer.finish());
            if let Err(e) = result {
                log::error!("Failed to finalise writer ({}): {}", writer.description(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(ExtractionError::Finalise(e)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audio::MemorySource;
    use crate::engine::testing::{
        mock_manager, mock_manager_with, recording_writer, recording_writer_failing_after,
        recording_writer_rejecting, writes, MockCounters, WriterEvent,
    };
    use crate::engine::RegistrationError;
    use crate::transform::Transform;

    fn ramp(frames: usize, rate: u32) -> MemorySource {
        MemorySource::new((0..frames).map(|i| i as f32).collect(), 1, rate)
    }

    fn timestamps(features: &[crate::plugin::Feature]) -> Vec<Duration> {
        features.iter().filter_map(|f| f.timestamp).collect()
    }

    #[test]
    fn test_run_without_transforms_fails() {
        let counters = MockCounters::default();
        let mut manager = mock_manager(&counters);
        assert!(matches!(manager.run(), Err(ExtractionError::NoTransforms)));
    }

    #[test]
    fn test_shared_instance_reset_once_per_source() {
        let counters = MockCounters::default();
        let mut manager = mock_manager_with(
            &counters,
            vec![("a", ramp(1000, 8000)), ("b", ramp(500, 8000))],
        );
        manager.set_default_sample_rate(8000);
        let (writer, _) = recording_writer();
        let first = manager
            .add_feature_extractor(Transform::new("mock:emitter").with_output("first"), vec![writer.clone()])
            .unwrap();
        let mean = manager
            .add_feature_extractor(Transform::new("mock:emitter").with_output("mean"), vec![writer])
            .unwrap();
        assert_eq!(first, mean);
        assert_eq!(counters.created.get(), 1);
        assert_eq!(manager.instance_count(), 1);

        manager.add_source("a").unwrap();
        manager.add_source("b").unwrap();
        let report = manager.run().unwrap();
        assert_eq!(report.completed, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(counters.resets.get(), 2);
    }

    #[test]
    fn test_single_rate_per_run() {
        let counters = MockCounters::default();
        let mut manager = mock_manager(&counters);
        manager.set_default_sample_rate(8000);
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![])
            .unwrap();
        manager
            .add_feature_extractor(
                Transform::new("mock:emitter").with_output("mean").with_sample_rate(44100),
                vec![],
            )
            .unwrap();
        manager
            .add_feature_extractor(Transform::new("mock:silent").with_sample_rate(22050), vec![])
            .unwrap();

        assert_eq!(manager.sample_rate(), 8000);
        assert!(manager.transforms().all(|(_, t)| t.sample_rate == 8000));
        // the overridden transform still shares the first instance
        assert_eq!(manager.instance_count(), 2);
    }

    #[test]
    fn test_registration_failures_leave_manager_unchanged() {
        let counters = MockCounters::default();
        let mut manager = mock_manager(&counters);
        assert!(matches!(
            manager.add_feature_extractor(Transform::new("mock:emitter"), vec![]),
            Err(RegistrationError::NoSampleRate { .. })
        ));

        manager.set_default_sample_rate(8000);
        let mut versioned = Transform::new("mock:emitter");
        versioned.plugin_version = Some(2);
        assert!(matches!(
            manager.add_feature_extractor(versioned, vec![]),
            Err(RegistrationError::VersionMismatch { requested: 2, found: 1, .. })
        ));
        assert!(matches!(
            manager.add_feature_extractor(Transform::new("mock:emitter").with_output("bogus"), vec![]),
            Err(RegistrationError::UnknownOutput { .. })
        ));
        assert!(matches!(
            manager.add_feature_extractor(Transform::new("mock:nooutputs"), vec![]),
            Err(RegistrationError::NoOutputs { .. })
        ));
        assert!(matches!(
            manager.add_feature_extractor(Transform::new("mock:missing"), vec![]),
            Err(RegistrationError::PluginLoad { .. })
        ));
        assert_eq!(manager.instance_count(), 0);
        assert_eq!(manager.sample_rate(), 0);

        // a bad output on a shared instance does not disturb the instance
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![])
            .unwrap();
        assert!(manager
            .add_feature_extractor(Transform::new("mock:emitter").with_output("bogus"), vec![])
            .is_err());
        assert_eq!(manager.transforms().count(), 1);
    }

    #[test]
    fn test_empty_output_resolves_to_first() {
        let counters = MockCounters::default();
        let mut manager = mock_manager(&counters);
        manager.set_default_sample_rate(8000);
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![])
            .unwrap();
        let (_, transform) = manager.transforms().next().unwrap();
        assert_eq!(transform.output, "first");
        assert_eq!((transform.step_size, transform.block_size), (256, 256));

        // the unresolved form finds the same registration again
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![])
            .unwrap();
        assert_eq!(manager.transforms().count(), 1);
        assert_eq!(counters.created.get(), 1);
    }

    #[test]
    fn test_default_transform() {
        let counters = MockCounters::default();
        let mut manager = mock_manager(&counters);
        assert!(matches!(
            manager.default_transform_for("mock:emitter"),
            Err(RegistrationError::NoSampleRate { .. })
        ));
        manager.set_default_sample_rate(8000);
        let transform = manager.default_transform_for("mock:emitter").unwrap();
        assert_eq!(transform.output, "first");
        assert_eq!(transform.sample_rate, 8000);
        assert_eq!((transform.step_size, transform.block_size), (256, 256));

        manager
            .add_default_feature_extractor("mock:emitter", vec![])
            .unwrap();
        assert_eq!(manager.instance_count(), 1);
    }

    #[test]
    fn test_stereo_mixdown_feeds_mean() {
        let counters = MockCounters::default();
        let left: Vec<f32> = (0..512).map(|i| i as f32).collect();
        let right = vec![1.0; 512];
        let source = MemorySource::from_channels(&[left, right], 8000);
        let mut manager = mock_manager_with(&counters, vec![("stereo", source)]);
        manager.set_block_size(512).unwrap();
        manager.set_default_sample_rate(8000);
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![])
            .unwrap();
        manager.add_source("stereo").unwrap();
        manager.run().unwrap();

        assert_eq!(*counters.first_samples.borrow(), vec![0.5, 128.5]);
    }

    #[test]
    fn test_multiplexed_sources_one_channel_each() {
        let counters = MockCounters::default();
        let mut manager = mock_manager_with(
            &counters,
            vec![
                ("left", MemorySource::new(vec![1.0; 256], 1, 8000)),
                ("right", MemorySource::new(vec![0.0; 256], 1, 8000)),
            ],
        );
        manager
            .add_multiplexed_source(&["left".to_string(), "right".to_string()])
            .unwrap();
        assert_eq!(manager.channels(), 2);
        assert_eq!(manager.source_ids(), vec!["left".to_string()]);

        manager.set_block_size(256).unwrap();
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![])
            .unwrap();
        assert_eq!(manager.sample_rate(), 8000);
        manager.run().unwrap();
        assert_eq!(*counters.first_samples.borrow(), vec![0.5]);
    }

    #[test]
    fn test_too_few_channels_fails_source() {
        let counters = MockCounters::default();
        let mut manager = mock_manager_with(&counters, vec![("mono", ramp(256, 8000))]);
        manager.set_channels(2).unwrap();
        manager.set_default_sample_rate(8000);
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![])
            .unwrap();
        manager.add_source("mono").unwrap();
        assert!(matches!(
            manager.run(),
            Err(ExtractionError::Source(SourceError::TooFewChannels { required: 2, .. }))
        ));
    }

    #[test]
    fn test_rate_inconsistency_aborts_even_when_continuing() {
        let counters = MockCounters::default();
        let mut manager = mock_manager_with(&counters, vec![("fast", ramp(256, 16000))]);
        manager.set_default_sample_rate(8000);
        manager.set_continue_on_error(true);
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![])
            .unwrap();
        manager.add_source("fast").unwrap();
        assert!(matches!(
            manager.run(),
            Err(ExtractionError::RateInconsistency { expected: 8000, found: 16000, .. })
        ));
    }

    #[test]
    fn test_scenario_silent_plugin_writes_nothing() {
        let counters = MockCounters::default();
        let mut manager = mock_manager_with(&counters, vec![("silence", MemorySource::silence(8000, 1, 8000))]);
        manager.set_default_sample_rate(8000);
        let (writer, events) = recording_writer();
        manager
            .add_feature_extractor(Transform::new("mock:silent").with_sizes(1024, 1024), vec![writer])
            .unwrap();
        manager.add_source("silence").unwrap();
        manager.run().unwrap();

        let events = events.borrow();
        let count = |pred: fn(&WriterEvent) -> bool| events.iter().filter(|e| pred(e)).count();
        assert_eq!(count(|e| matches!(e, WriterEvent::Write { .. })), 0);
        assert_eq!(count(|e| matches!(e, WriterEvent::Metadata(..))), 1);
        assert_eq!(count(|e| matches!(e, WriterEvent::Finish)), 1);
    }

    #[test]
    fn test_scenario_two_outputs_one_instance() {
        let counters = MockCounters::default();
        let mut manager = mock_manager_with(&counters, vec![("ramp", ramp(1024, 8000).with_title("Ramp"))]);
        manager.set_block_size(1024).unwrap();
        manager.set_default_sample_rate(8000);
        let (writer, events) = recording_writer();
        manager
            .add_feature_extractor(Transform::new("mock:emitter").with_output("first"), vec![writer.clone()])
            .unwrap();
        manager
            .add_feature_extractor(Transform::new("mock:emitter").with_output("mean"), vec![writer])
            .unwrap();
        assert_eq!(manager.instance_count(), 1);
        assert_eq!(manager.transforms().count(), 2);

        manager.add_source("ramp").unwrap();
        manager.run().unwrap();
        assert_eq!(counters.created.get(), 1);
        assert_eq!(counters.timestamps.borrow().len(), 4);

        let written = writes(&events);
        let firsts: Vec<f32> = written
            .iter()
            .filter(|(output, ..)| output == "first")
            .flat_map(|(_, _, features)| features.iter())
            .filter(|f| f.label.is_empty())
            .map(|f| f.values[0])
            .collect();
        assert_eq!(firsts, *counters.first_samples.borrow());
        let means = written
            .iter()
            .filter(|(output, ..)| output == "mean")
            .map(|(_, _, features)| features.len())
            .sum::<usize>();
        assert_eq!(means, 4);

        // drained features come after every block feature
        let (output, _, last) = written.last().unwrap();
        assert_eq!(output, "first");
        assert_eq!(last[0].label, "end");

        let events = events.borrow();
        assert!(matches!(&events[0], WriterEvent::TestOutput(id) if id == "ramp"));
        assert!(matches!(&events[1], WriterEvent::Metadata(_, m) if m.title == "Ramp"));
        assert_eq!(events[events.len() - 2], WriterEvent::Flush);
        assert_eq!(events[events.len() - 1], WriterEvent::Finish);
    }

    #[test]
    fn test_windowed_transform_sees_only_its_window() {
        let counters = MockCounters::default();
        let mut manager = mock_manager_with(&counters, vec![("ramp", ramp(8000, 8000))]);
        manager.set_block_size(1024).unwrap();
        manager.set_default_sample_rate(8000);

        let (windowed_writer, windowed) = recording_writer();
        let (whole_writer, whole) = recording_writer();
        let start = Duration::from_millis(250);
        let duration = Duration::from_millis(250);
        manager
            .add_feature_extractor(
                Transform::new("mock:emitter").with_window(start, duration),
                vec![windowed_writer],
            )
            .unwrap();
        manager
            .add_feature_extractor(Transform::new("mock:emitter").with_output("mean"), vec![whole_writer])
            .unwrap();
        assert_eq!(manager.instance_count(), 2);
        manager.add_source("ramp").unwrap();
        manager.run().unwrap();

        let inside: Vec<Duration> = writes(&windowed)
            .iter()
            .flat_map(|(_, _, features)| timestamps(features))
            .collect();
        assert_eq!(inside.len(), 8);
        assert!(inside.iter().all(|t| *t >= start && *t < start + duration));

        let all: Vec<Duration> = writes(&whole)
            .iter()
            .flat_map(|(_, _, features)| timestamps(features))
            .collect();
        assert_eq!(all.len(), 32);
        assert_eq!(all[0], Duration::ZERO);
    }

    #[test]
    fn test_transform_summary_receives_only_its_kind() {
        let counters = MockCounters::default();
        let source = MemorySource::new(vec![0.5; 1024], 1, 8000);
        let mut manager = mock_manager_with(&counters, vec![("flat", source)]);
        manager.set_block_size(1024).unwrap();
        manager.set_default_sample_rate(8000);
        let (mean_writer, mean_events) = recording_writer();
        let (plain_writer, plain_events) = recording_writer();
        manager
            .add_feature_extractor(
                Transform::new("mock:emitter")
                    .with_output("mean")
                    .with_summary(SummaryType::Mean),
                vec![mean_writer],
            )
            .unwrap();
        manager
            .add_feature_extractor(Transform::new("mock:emitter").with_output("mean"), vec![plain_writer])
            .unwrap();
        assert_eq!(manager.instance_count(), 1);
        manager.add_source("flat").unwrap();
        manager.run().unwrap();

        let summarised = writes(&mean_events);
        assert_eq!(summarised.len(), 1);
        let (_, kind, features) = &summarised[0];
        assert_eq!(kind, "mean");
        assert!((features[0].values[0] - 0.5).abs() < 1e-6);

        let plain = writes(&plain_events);
        assert!(!plain.is_empty());
        assert!(plain.iter().all(|(_, kind, _)| kind.is_empty()));
    }

    #[test]
    fn test_run_level_summaries_reach_unsummarised_transforms() {
        let counters = MockCounters::default();
        let mut manager = mock_manager_with(&counters, vec![("ramp", ramp(1024, 8000))]);
        manager.set_block_size(1024).unwrap();
        manager.set_default_sample_rate(8000);
        manager
            .set_summary_types(&[SummaryType::Minimum, SummaryType::Maximum], true, &[])
            .unwrap();
        let (writer, events) = recording_writer();
        manager
            .add_feature_extractor(Transform::new("mock:emitter").with_output("mean"), vec![writer])
            .unwrap();
        manager.add_source("ramp").unwrap();
        manager.run().unwrap();

        let kinds: Vec<String> = writes(&events).into_iter().map(|(_, kind, _)| kind).collect();
        assert_eq!(kinds, vec!["min".to_string(), "max".to_string()]);
    }

    #[test]
    fn test_continue_on_error_skips_failed_source() {
        let counters = MockCounters::default();
        let sources = vec![("bad", ramp(256, 8000)), ("good", ramp(256, 8000))];
        let mut manager = mock_manager_with(&counters, sources.clone());
        manager.set_default_sample_rate(8000);
        manager.set_continue_on_error(true);
        let (writer, events) = recording_writer_rejecting(Some("bad"));
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![writer])
            .unwrap();
        manager.add_source("bad").unwrap();
        manager.add_source("good").unwrap();
        let report = manager.run().unwrap();
        assert_eq!(report.completed, vec!["good".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_success());
        assert_eq!(
            events.borrow().iter().filter(|e| **e == WriterEvent::Finish).count(),
            1
        );

        let mut manager = mock_manager_with(&counters, sources);
        manager.set_default_sample_rate(8000);
        let (writer, events) = recording_writer_rejecting(Some("bad"));
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![writer])
            .unwrap();
        manager.add_source("bad").unwrap();
        manager.add_source("good").unwrap();
        assert!(matches!(
            manager.run(),
            Err(ExtractionError::Source(SourceError::WriterRejected { .. }))
        ));
        let events = events.borrow();
        assert!(!events.iter().any(|e| matches!(e, WriterEvent::Metadata(id, _) if id == "good")));
        assert_eq!(events.last(), Some(&WriterEvent::Finish));
    }

    #[test]
    fn test_unknown_source_rejected_when_added() {
        let counters = MockCounters::default();
        let mut manager = mock_manager(&counters);
        assert!(matches!(
            manager.add_source("nowhere"),
            Err(SourceError::NotFound { .. })
        ));
        assert!(manager.source_ids().is_empty());
    }

    #[test]
    fn test_first_source_sets_default_rate() {
        let counters = MockCounters::default();
        let mut manager = mock_manager_with(&counters, vec![("a", ramp(256, 11025))]);
        manager.add_source("a").unwrap();
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![])
            .unwrap();
        assert_eq!(manager.sample_rate(), 11025);
    }

    #[test]
    fn test_progress_reaches_completion() {
        let counters = MockCounters::default();
        let mut manager = mock_manager_with(&counters, vec![("ramp", ramp(4096, 8000))]);
        manager.set_block_size(1024).unwrap();
        manager.set_default_sample_rate(8000);
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![])
            .unwrap();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = seen.clone();
        manager.set_progress_callback(move |_, percent| sink.borrow_mut().push(percent));
        manager.add_source("ramp").unwrap();
        manager.run().unwrap();
        assert_eq!(*seen.borrow(), vec![25, 50, 75, 100]);
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let run_once = || {
            let counters = MockCounters::default();
            let mut manager = mock_manager_with(&counters, vec![("ramp", ramp(3000, 8000))]);
            manager.set_block_size(1024).unwrap();
            manager.set_default_sample_rate(8000);
            manager
                .set_summary_types(&[SummaryType::Median], false, &[])
                .unwrap();
            let (writer, events) = recording_writer();
            manager
                .add_feature_extractor(Transform::new("mock:emitter"), vec![writer.clone()])
                .unwrap();
            manager
                .add_feature_extractor(Transform::new("mock:emitter").with_output("mean"), vec![writer])
                .unwrap();
            manager.add_source("ramp").unwrap();
            manager.run().unwrap();
            let events = events.borrow().clone();
            events
        };
        assert_eq!(run_once(), run_once());
    }

    #[test]
    fn test_one_decoded_source_at_a_time() {
        let ids = ["a", "b", "c", "d", "e"];
        let sources = || ids.iter().map(|id| (*id, ramp(2048, 8000))).collect::<Vec<_>>();

        // The first source supplies the rate and stays open; the rest are only checked
        let counters = MockCounters::default();
        let mut manager = mock_manager_with(&counters, sources());
        for id in ids {
            manager.add_source(id).unwrap();
        }
        assert_eq!(counters.live_sources.get(), 1);
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![])
            .unwrap();
        let report = manager.run().unwrap();
        assert_eq!(report.completed.len(), 5);
        assert_eq!(counters.peak_live_sources.get(), 1);
        assert_eq!(counters.live_sources.get(), 0);

        // With a rate given up front nothing is decoded before the run
        let counters = MockCounters::default();
        let mut manager = mock_manager_with(&counters, sources());
        manager.set_default_sample_rate(8000);
        for id in ids {
            manager.add_source(id).unwrap();
        }
        assert_eq!(counters.peak_live_sources.get(), 0);
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![])
            .unwrap();
        manager.run().unwrap();
        assert_eq!(counters.peak_live_sources.get(), 1);
        assert_eq!(counters.live_sources.get(), 0);
    }

    #[test]
    fn test_windowed_summary_covers_only_the_window() {
        let counters = MockCounters::default();
        let mut manager = mock_manager_with(&counters, vec![("ramp", ramp(8000, 8000))]);
        manager.set_block_size(1024).unwrap();
        manager.set_default_sample_rate(8000);

        let (writer, events) = recording_writer();
        let start = Duration::from_millis(250);
        let duration = Duration::from_millis(250);
        manager
            .add_feature_extractor(
                Transform::new("mock:emitter")
                    .with_output("first")
                    .with_window(start, duration)
                    .with_summary(SummaryType::Minimum),
                vec![writer],
            )
            .unwrap();
        // Starts the block loop at zero, so the windowed instance also sees
        // the block straddling its start
        manager
            .add_feature_extractor(Transform::new("mock:emitter").with_output("mean"), vec![])
            .unwrap();
        manager.add_source("ramp").unwrap();
        manager.run().unwrap();

        let written = writes(&events);
        assert_eq!(written.len(), 1);
        let (output, summary, features) = &written[0];
        assert_eq!((output.as_str(), summary.as_str()), ("first", "min"));
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].timestamp, Some(start));
        assert_eq!(features[0].duration, Some(duration));
        assert!(features[0].values[0] >= 2000.0);
        assert!(features[0].values[0] < 4000.0);
    }

    #[test]
    fn test_segment_summaries_in_boundary_order() {
        let counters = MockCounters::default();
        let mut manager = mock_manager_with(&counters, vec![("ramp", ramp(8000, 8000))]);
        manager.set_block_size(1024).unwrap();
        manager.set_default_sample_rate(8000);
        manager
            .set_summary_types(
                &[SummaryType::Mean],
                true,
                &[Duration::from_millis(500), Duration::from_millis(250)],
            )
            .unwrap();
        let (writer, events) = recording_writer();
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![writer])
            .unwrap();
        manager.add_source("ramp").unwrap();
        manager.run().unwrap();

        let written = writes(&events);
        assert_eq!(written.len(), 1);
        let (_, summary, segments) = &written[0];
        assert_eq!(summary, "mean");
        let starts: Vec<Duration> = timestamps(segments);
        assert_eq!(
            starts,
            vec![Duration::ZERO, Duration::from_millis(250), Duration::from_millis(500)]
        );
        assert_eq!(segments[0].duration, Some(Duration::from_millis(250)));
        assert_eq!(segments[1].duration, Some(Duration::from_millis(250)));
        assert!(segments[0].values[0] < segments[1].values[0]);
    }

    #[test]
    fn test_write_failure_aborts_even_when_continuing() {
        let counters = MockCounters::default();
        let mut manager = mock_manager_with(
            &counters,
            vec![("a", ramp(2048, 8000)), ("b", ramp(2048, 8000))],
        );
        manager.set_block_size(1024).unwrap();
        manager.set_default_sample_rate(8000);
        manager.set_continue_on_error(true);
        let (writer, events) = recording_writer_failing_after(1);
        manager
            .add_feature_extractor(Transform::new("mock:emitter"), vec![writer])
            .unwrap();
        manager.add_source("a").unwrap();
        manager.add_source("b").unwrap();

        assert!(matches!(
            manager.run(),
            Err(ExtractionError::Writer { ref source_id, .. }) if source_id == "a"
        ));
        let events = events.borrow();
        assert_eq!(writes_in(&events), 1);
        assert!(!events.contains(&WriterEvent::TestOutput("b".to_string())));
        assert_eq!(events.iter().filter(|e| **e == WriterEvent::Finish).count(), 1);
    }

    fn writes_in(events: &[WriterEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, WriterEvent::Write { .. }))
            .count()
    }
}
