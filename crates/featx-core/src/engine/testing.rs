//! Test doubles for engine tests: a counting mock plugin, an in-memory source
//! provider and a writer that records every call

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use super::ExtractionManager;
use crate::audio::{AudioSource, MemorySource, SourceError, SourceProvider, SourceResult};
use crate::plugin::{
    AnalysisPlugin, Feature, FeatureSet, InputDomain, OutputDescriptor, PluginRegistry,
    PluginResult,
};
use crate::transform::Transform;
use crate::writer::{shared, FeatureWriter, SharedWriter, TrackMetadata, WriterError, WriterResult};

/// Shared counters observed by every mock plugin a manager creates
#[derive(Clone, Default)]
pub(crate) struct MockCounters {
    pub created: Rc<Cell<usize>>,
    pub resets: Rc<Cell<usize>>,
    /// Timestamp of every block the plugin itself processed
    pub timestamps: Rc<RefCell<Vec<Duration>>>,
    /// First sample of channel 0 of every processed block
    pub first_samples: Rc<RefCell<Vec<f32>>>,
    /// Sources opened by the provider and not yet dropped
    pub live_sources: Rc<Cell<usize>>,
    pub peak_live_sources: Rc<Cell<usize>>,
}

/// Emits the first sample and the mean of channel 0 per block, plus one
/// labelled feature at end of stream
struct MockEmitter {
    counters: MockCounters,
    sample_rate: u32,
    silent: bool,
    has_outputs: bool,
}

impl AnalysisPlugin for MockEmitter {
    fn identifier(&self) -> &str {
        "emitter"
    }

    fn name(&self) -> &str {
        "Mock Emitter"
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
        256
    }

    fn initialise(&mut self, _channels: usize, _step_size: usize, _block_size: usize) -> PluginResult<()> {
        Ok(())
    }

    fn reset(&mut self) {
        self.counters.resets.set(self.counters.resets.get() + 1);
    }

    fn outputs(&self) -> Vec<OutputDescriptor> {
        if !self.has_outputs {
            return Vec::new();
        }
        if self.silent {
            return vec![OutputDescriptor::new("nothing", "Nothing").with_bin_count(Some(0))];
        }
        vec![
            OutputDescriptor::new("first", "First Sample"),
            OutputDescriptor::new("mean", "Block Mean"),
        ]
    }

    fn process(&mut self, input: &[&[f32]], timestamp: Duration) -> PluginResult<FeatureSet> {
        let mut features = FeatureSet::new();
        if self.silent {
            return Ok(features);
        }
        let channel = input.first().copied().unwrap_or(&[]);
        let first = channel.first().copied().unwrap_or(0.0);
        let mean = channel.iter().sum::<f32>() / channel.len().max(1) as f32;
        self.counters.timestamps.borrow_mut().push(timestamp);
        self.counters.first_samples.borrow_mut().push(first);

        features.insert(0, vec![Feature::with_values(vec![first])]);
        features.insert(1, vec![Feature::with_values(vec![mean])]);
        Ok(features)
    }

    fn remaining_features(&mut self) -> PluginResult<FeatureSet> {
        let mut features = FeatureSet::new();
        if !self.silent {
            features.insert(
                0,
                vec![Feature {
                    values: vec![0.0],
                    label: "end".to_string(),
                    ..Default::default()
                }],
            );
        }
        Ok(features)
    }
}

/// An in-memory source that keeps the live-source count while it exists
struct CountedSource {
    audio: MemorySource,
    live: Rc<Cell<usize>>,
}

impl AudioSource for CountedSource {
    fn channel_count(&self) -> usize {
        self.audio.channel_count()
    }

    fn sample_rate(&self) -> u32 {
        self.audio.sample_rate()
    }

    fn frame_count(&self) -> u64 {
        self.audio.frame_count()
    }

    fn interleaved_frames(&self, start: u64, count: usize) -> Vec<f32> {
        self.audio.interleaved_frames(start, count)
    }

    fn title(&self) -> &str {
        self.audio.title()
    }

    fn maker(&self) -> &str {
        self.audio.maker()
    }
}

impl Drop for CountedSource {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

/// Serves in-memory sources by identifier, ignoring the requested rate
struct MemoryProvider {
    sources: BTreeMap<String, MemorySource>,
    counters: MockCounters,
}

impl MemoryProvider {
    fn lookup(&self, source_id: &str) -> SourceResult<&MemorySource> {
        self.sources.get(source_id).ok_or_else(|| SourceError::NotFound {
            source_id: source_id.to_string(),
        })
    }
}

impl SourceProvider for MemoryProvider {
    fn open(&self, source_id: &str, _sample_rate: Option<u32>) -> SourceResult<Box<dyn AudioSource>> {
        let audio = self.lookup(source_id)?.clone();
        let live = self.counters.live_sources.clone();
        live.set(live.get() + 1);
        let peak = &self.counters.peak_live_sources;
        peak.set(peak.get().max(live.get()));
        Ok(Box::new(CountedSource { audio, live }))
    }

    fn check(&self, source_id: &str) -> SourceResult<()> {
        self.lookup(source_id).map(|_| ())
    }
}

fn mock_registry(counters: &MockCounters) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    for (key, silent, has_outputs) in [
        ("mock:emitter", false, true),
        ("mock:silent", true, true),
        ("mock:nooutputs", false, false),
    ] {
        let counters = counters.clone();
        registry.register(key, move |sample_rate| {
            counters.created.set(counters.created.get() + 1);
            Box::new(MockEmitter {
                counters: counters.clone(),
                sample_rate,
                silent,
                has_outputs,
            }) as Box<dyn AnalysisPlugin>
        });
    }
    registry
}

/// Manager with the mock plugins and no sources
pub(crate) fn mock_manager(counters: &MockCounters) -> ExtractionManager {
    mock_manager_with(counters, Vec::new())
}

/// Manager with the mock plugins and the given in-memory sources
pub(crate) fn mock_manager_with(counters: &MockCounters, sources: Vec<(&str, MemorySource)>) -> ExtractionManager {
    let provider = MemoryProvider {
        sources: sources
            .into_iter()
            .map(|(id, s)| (id.to_string(), s))
            .collect(),
        counters: counters.clone(),
    };
    ExtractionManager::with_components(Box::new(mock_registry(counters)), Box::new(provider))
}

/// Everything a [`RecordingWriter`] was asked to do, in order
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WriterEvent {
    TestOutput(String),
    Metadata(String, TrackMetadata),
    Write {
        source_id: String,
        transform: Transform,
        output: String,
        summary: String,
        features: Vec<Feature>,
    },
    Flush,
    Finish,
}

pub(crate) type EventLog = Rc<RefCell<Vec<WriterEvent>>>;

pub(crate) struct RecordingWriter {
    events: EventLog,
    reject: Option<String>,
    /// Fail every `write` after this many have succeeded
    write_limit: Option<usize>,
    written: usize,
}

impl FeatureWriter for RecordingWriter {
    fn description(&self) -> &str {
        "records calls"
    }

    fn test_output(&mut self, source_id: &str) -> WriterResult<()> {
        self.events
            .borrow_mut()
            .push(WriterEvent::TestOutput(source_id.to_string()));
        if self.reject.as_deref() == Some(source_id) {
            return Err(WriterError::Rejected {
                target: source_id.to_string(),
                reason: "rejected by test".to_string(),
            });
        }
        Ok(())
    }

    fn set_track_metadata(&mut self, source_id: &str, metadata: &TrackMetadata) -> WriterResult<()> {
        self.events
            .borrow_mut()
            .push(WriterEvent::Metadata(source_id.to_string(), metadata.clone()));
        Ok(())
    }

    fn write(
        &mut self,
        source_id: &str,
        transform: &Transform,
        output: &OutputDescriptor,
        features: &[Feature],
        summary: &str,
    ) -> WriterResult<()> {
        if self.write_limit.is_some_and(|limit| self.written >= limit) {
            return Err(WriterError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "disk full",
            )));
        }
        self.written += 1;
        self.events.borrow_mut().push(WriterEvent::Write {
            source_id: source_id.to_string(),
            transform: transform.clone(),
            output: output.identifier.clone(),
            summary: summary.to_string(),
            features: features.to_vec(),
        });
        Ok(())
    }

    fn flush(&mut self) -> WriterResult<()> {
        self.events.borrow_mut().push(WriterEvent::Flush);
        Ok(())
    }

    fn finish(&mut self) -> WriterResult<()> {
        self.events.borrow_mut().push(WriterEvent::Finish);
        Ok(())
    }
}

/// A recording writer and its event log
pub(crate) fn recording_writer() -> (SharedWriter, EventLog) {
    recording_writer_rejecting(None)
}

/// A recording writer whose `test_output` fails for `reject`
pub(crate) fn recording_writer_rejecting(reject: Option<&str>) -> (SharedWriter, EventLog) {
    let events = EventLog::default();
    let writer = shared(RecordingWriter {
        events: events.clone(),
        reject: reject.map(str::to_string),
        write_limit: None,
        written: 0,
    });
    (writer, events)
}

/// A recording writer whose `write` fails once `limit` writes have succeeded
pub(crate) fn recording_writer_failing_after(limit: usize) -> (SharedWriter, EventLog) {
    let events = EventLog::default();
    let writer = shared(RecordingWriter {
        events: events.clone(),
        reject: None,
        write_limit: Some(limit),
        written: 0,
    });
    (writer, events)
}

/// Every write event as `(output, summary, features)`
pub(crate) fn writes(events: &EventLog) -> Vec<(String, String, Vec<Feature>)> {
    events
        .borrow()
        .iter()
        .filter_map(|e| match e {
            WriterEvent::Write {
                output,
                summary,
                features,
                ..
            } => Some((output.clone(), summary.clone(), features.clone())),
            _ => None,
        })
        .collect()
}
