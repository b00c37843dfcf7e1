//! Decoded audio files
//!
//! Files are decoded completely into memory with symphonia and, when the run
//! needs a different rate, resampled with rubato before extraction starts.

use std::fs::File;
use std::path::{Path, PathBuf};

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, StandardTagKey, Tag};
use symphonia::core::probe::{Hint, ProbeResult};

use super::{AudioSource, MemorySource, SourceError, SourceProvider, SourceResult};

/// File extensions recognised when scanning directories
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "wav", "wave", "aif", "aiff", "flac", "mp3", "ogg", "oga", "m4a", "mp4", "aac", "caf", "mkv",
    "webm",
];

#[derive(Default)]
struct Tags {
    title: Option<String>,
    maker: Option<String>,
}

impl Tags {
    fn read(&mut self, tags: &[Tag]) {
        for tag in tags {
            match tag.std_key {
                Some(StandardTagKey::TrackTitle) if self.title.is_none() => {
                    self.title = Some(tag.value.to_string());
                }
                Some(StandardTagKey::Artist) if self.maker.is_none() => {
                    self.maker = Some(tag.value.to_string());
                }
                _ => {}
            }
        }
    }
}

/// An audio file decoded into memory
pub struct FileSource {
    path: PathBuf,
    native_rate: u32,
    audio: MemorySource,
}

impl FileSource {
    /// Decode `path`, resampling to `target_rate` if given
    pub fn open(path: &Path, target_rate: Option<u32>) -> SourceResult<Self> {
        let id = path.display().to_string();
        let (samples, native_rate, channels, tags) = decode(path, &id)?;

        let mut rate = native_rate;
        let mut samples = samples;
        if let Some(target) = target_rate.filter(|t| *t != native_rate && *t > 0) {
            samples = resample(&samples, channels, native_rate, target, &id)?;
            rate = target;
        }

        let title = tags.title.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let audio = MemorySource::new(samples, channels, rate)
            .with_title(title)
            .with_maker(tags.maker.unwrap_or_default());

        log::info!(
            "Opened {}-channel file '{}' ({} Hz{}, {} frames)",
            channels,
            id,
            native_rate,
            if rate != native_rate {
                format!(" resampled to {} Hz", rate)
            } else {
                String::new()
            },
            audio.frame_count()
        );

        Ok(Self {
            path: path.to_path_buf(),
            native_rate,
            audio,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sample rate of the file before any resampling
    pub fn native_sample_rate(&self) -> u32 {
        self.native_rate
    }
}

impl AudioSource for FileSource {
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

fn unsupported(id: &str, reason: impl Into<String>) -> SourceError {
    SourceError::UnsupportedFormat {
        source_id: id.to_string(),
        reason: reason.into(),
    }
}

/// Open `path` and identify its container, reading no audio packets
fn probe(path: &Path, id: &str) -> SourceResult<ProbeResult> {
    let file = File::open(path).map_err(|e| SourceError::io(id, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| unsupported(id, e.to_string()))
}

fn has_audio_track(format: &dyn FormatReader) -> bool {
    format
        .tracks()
        .iter()
        .any(|t| t.codec_params.codec != CODEC_TYPE_NULL)
}

/// Decode an entire file to interleaved f32
fn decode(path: &Path, id: &str) -> SourceResult<(Vec<f32>, u32, usize, Tags)> {
    let mut probed = probe(path, id)?;

    let mut tags = Tags::default();
    if let Some(metadata) = probed.metadata.get() {
        if let Some(revision) = metadata.current() {
            tags.read(revision.tags());
        }
    }

    let mut format = probed.format;
    if let Some(revision) = format.metadata().current() {
        tags.read(revision.tags());
    }

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| unsupported(id, "no audio track found"))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| unsupported(id, "unknown sample rate"))?;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| unsupported(id, e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(SourceError::Decode {
                    source_id: id.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet in '{}': {}", id, e);
                continue;
            }
            Err(e) => {
                return Err(SourceError::Decode {
                    source_id: id.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            channels = spec.channels.count();
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    Ok((samples, sample_rate, channels.max(1), tags))
}

/// Resample interleaved audio from `from` Hz to `to` Hz
fn resample(samples: &[f32], channels: usize, from: u32, to: u32, id: &str) -> SourceResult<Vec<f32>> {
    let frames = samples.len() / channels;
    if frames == 0 {
        return Ok(Vec::new());
    }
    let resample_err = |reason: String| SourceError::Resample {
        source_id: id.to_string(),
        target_rate: to,
        reason,
    };

    let waves_in: Vec<Vec<f32>> = (0..channels)
        .map(|c| samples.iter().skip(c).step_by(channels).copied().collect())
        .collect();

    let ratio = to as f64 / from as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, frames, channels)
        .map_err(|e| resample_err(e.to_string()))?;

    let delay = resampler.output_delay();
    let mut waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| resample_err(e.to_string()))?;
    // Flush what is still inside the filter
    let tail = resampler
        .process_partial::<Vec<f32>>(None, None)
        .map_err(|e| resample_err(e.to_string()))?;
    for (out, rest) in waves_out.iter_mut().zip(tail) {
        out.extend(rest);
    }

    let expected = (frames as f64 * ratio).round() as usize;
    let mut interleaved = vec![0.0; expected * channels];
    for (c, wave) in waves_out.iter().enumerate() {
        for (i, s) in wave.iter().skip(delay).take(expected).enumerate() {
            interleaved[i * channels + c] = *s;
        }
    }

    log::debug!(
        "Resampled '{}' from {} Hz to {} Hz ({} -> {} frames)",
        id,
        from,
        to,
        frames,
        expected
    );
    Ok(interleaved)
}

/// Opens local files (optionally given as `file://` URLs)
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSourceProvider;

impl FileSourceProvider {
    pub fn new() -> Self {
        Self
    }
}

impl FileSourceProvider {
    /// Local path of `source_id`, accepting `file://` URLs
    fn local_path(source_id: &str) -> SourceResult<&Path> {
        match source_id.strip_prefix("file://") {
            Some(local) => Ok(Path::new(local)),
            None if source_id.contains("://") => {
                Err(unsupported(source_id, "only local files are supported"))
            }
            None => Ok(Path::new(source_id)),
        }
    }
}

impl SourceProvider for FileSourceProvider {
    fn open(&self, source_id: &str, sample_rate: Option<u32>) -> SourceResult<Box<dyn AudioSource>> {
        let path = Self::local_path(source_id)?;
        Ok(Box::new(FileSource::open(path, sample_rate)?))
    }

    fn check(&self, source_id: &str) -> SourceResult<()> {
        let path = Self::local_path(source_id)?;
        let probed = probe(path, source_id)?;
        if !has_audio_track(probed.format.as_ref()) {
            return Err(unsupported(source_id, "no audio track found"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            for c in 0..channels {
                let v = if c == 0 { 8192 } else { -8192 };
                writer.write_sample(if i % 2 == 0 { v } else { v / 2 }).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 2, 8000, 800);

        let source = FileSource::open(&path, None).unwrap();
        assert_eq!(source.channel_count(), 2);
        assert_eq!(source.sample_rate(), 8000);
        assert_eq!(source.frame_count(), 800);
        assert_eq!(source.title(), "tone");

        let frames = source.interleaved_frames(0, 2);
        assert!((frames[0] - 0.25).abs() < 1e-3);
        assert!((frames[1] + 0.25).abs() < 1e-3);
        assert!((frames[2] - 0.125).abs() < 1e-3);
    }

    #[test]
    fn test_resample_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 1, 8000, 8000);

        let source = FileSource::open(&path, Some(16000)).unwrap();
        assert_eq!(source.native_sample_rate(), 8000);
        assert_eq!(source.sample_rate(), 16000);
        assert_eq!(source.frame_count(), 16000);
    }

    #[test]
    fn test_provider_errors() {
        let provider = FileSourceProvider::new();
        assert!(matches!(
            provider.open("/definitely/not/here.wav", None),
            Err(SourceError::NotFound { .. })
        ));
        assert!(matches!(
            provider.open("http://example.com/a.wav", None),
            Err(SourceError::UnsupportedFormat { .. })
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.wav");
        std::fs::write(&path, b"not audio at all").unwrap();
        assert!(matches!(
            provider.open(path.to_str().unwrap(), None),
            Err(SourceError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_check_without_decoding() {
        let provider = FileSourceProvider::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.wav");
        write_wav(&path, 1, 8000, 80);
        let url = format!("file://{}", path.display());

        assert!(provider.check(path.to_str().unwrap()).is_ok());
        assert!(provider.check(&url).is_ok());
        assert!(matches!(
            provider.check("/definitely/not/here.wav"),
            Err(SourceError::NotFound { .. })
        ));
        assert!(matches!(
            provider.check("http://example.com/a.wav"),
            Err(SourceError::UnsupportedFormat { .. })
        ));

        let junk = dir.path().join("junk.flac");
        std::fs::write(&junk, b"nothing to see").unwrap();
        assert!(matches!(
            provider.check(junk.to_str().unwrap()),
            Err(SourceError::UnsupportedFormat { .. })
        ));
    }
}
