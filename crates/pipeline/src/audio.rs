//! Audio probing and conversion
//!
//! Chunk offsets must follow the real length of each encoded chunk, not the
//! provider-reported length, or timings drift across chunk boundaries.

use std::ffi::OsStr;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use karaoke_tts_config::AudioConfig;
use serde::Deserialize;

use crate::process::{self, CommandError};

/// Measures the playback duration of encoded audio
#[async_trait::async_trait]
pub trait AudioProbe: Send + Sync {
    /// Duration in milliseconds; never fails, falls back to an estimate
    async fn duration_ms(&self, audio: &[u8]) -> f64;
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Probe reading WAV headers directly and asking ffprobe for anything else
#[derive(Debug, Clone)]
pub struct ContainerProbe {
    config: AudioConfig,
    /// Extension for temporary files handed to ffprobe
    extension: String,
}

impl ContainerProbe {
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            extension: "mp3".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Exact duration from a RIFF/WAVE header
    pub fn wav_duration_ms(audio: &[u8]) -> Option<f64> {
        if !is_wav(audio) {
            return None;
        }
        let reader = hound::WavReader::new(Cursor::new(audio)).ok()?;
        let rate = reader.spec().sample_rate;
        if rate == 0 {
            return None;
        }
        Some(reader.duration() as f64 * 1000.0 / rate as f64)
    }

    /// Size-based estimate at the configured bitrate
    pub fn estimate_from_bitrate(&self, audio: &[u8]) -> f64 {
        let bytes_per_second = self.config.fallback_bitrate.max(8) as f64 / 8.0;
        audio.len() as f64 / bytes_per_second * 1000.0
    }

    async fn ffprobe_duration_ms(&self, audio: &[u8]) -> Option<f64> {
        let file = tempfile::Builder::new()
            .prefix("karaoke-probe-")
            .suffix(&format!(".{}", self.extension))
            .tempfile()
            .ok()?;
        tokio::fs::write(file.path(), audio).await.ok()?;

        let args = [
            OsStr::new("-v"),
            OsStr::new("quiet"),
            OsStr::new("-print_format"),
            OsStr::new("json"),
            OsStr::new("-show_format"),
            file.path().as_os_str(),
        ];
        let output = match process::run(
            &self.config.ffprobe_command,
            args,
            None,
            Duration::from_secs(self.config.probe_timeout_secs),
        )
        .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!(error = %e, "ffprobe unavailable");
                return None;
            }
        };

        let parsed: FfprobeOutput = serde_json::from_str(&output.stdout).ok()?;
        let seconds: f64 = parsed.format.duration?.trim().parse().ok()?;
        (seconds.is_finite() && seconds > 0.0).then_some(seconds * 1000.0)
    }
}

#[async_trait::async_trait]
impl AudioProbe for ContainerProbe {
    async fn duration_ms(&self, audio: &[u8]) -> f64 {
        let measured = match Self::wav_duration_ms(audio) {
            Some(ms) => ms,
            None => match self.ffprobe_duration_ms(audio).await {
                Some(ms) => ms,
                None => {
                    let estimate = self.estimate_from_bitrate(audio);
                    tracing::warn!(
                        bytes = audio.len(),
                        estimate_ms = estimate,
                        "Could not probe audio duration, estimating from bitrate"
                    );
                    estimate
                }
            },
        };
        measured.max(self.config.min_duration_ms)
    }
}

fn is_wav(audio: &[u8]) -> bool {
    audio.len() >= 12 && &audio[0..4] == b"RIFF" && &audio[8..12] == b"WAVE"
}

/// Join encoded chunks in order
///
/// MP3 frames are self-delimiting and are joined byte for byte. WAV chunks
/// are decoded and rewritten under a single header; they must share a spec.
pub fn concat_audio(chunks: &[Vec<u8>]) -> Result<Vec<u8>, hound::Error> {
    let parts: Vec<&[u8]> = chunks
        .iter()
        .map(Vec::as_slice)
        .filter(|c| !c.is_empty())
        .collect();
    match parts.first() {
        Some(first) if is_wav(first) => concat_wav(&parts),
        _ => Ok(parts.concat()),
    }
}

fn concat_wav(parts: &[&[u8]]) -> Result<Vec<u8>, hound::Error> {
    let first = parts.first().copied().unwrap_or_default();
    let spec = hound::WavReader::new(Cursor::new(first))?.spec();

    let mut out = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut out, spec)?;
        for part in parts {
            let mut reader = hound::WavReader::new(Cursor::new(*part))?;
            if reader.spec() != spec {
                return Err(hound::Error::FormatError("chunks differ in WAV format"));
            }
            match spec.sample_format {
                hound::SampleFormat::Int => {
                    for sample in reader.samples::<i32>() {
                        writer.write_sample(sample?)?;
                    }
                }
                hound::SampleFormat::Float => {
                    for sample in reader.samples::<f32>() {
                        writer.write_sample(sample?)?;
                    }
                }
            }
        }
        writer.finalize()?;
    }
    Ok(out.into_inner())
}

/// Convert any ffmpeg-readable file to mono PCM WAV at `sample_rate`
pub(crate) async fn convert_to_wav(
    ffmpeg: &str,
    input: &Path,
    output: &Path,
    sample_rate: u32,
    timeout: Duration,
) -> Result<(), CommandError> {
    let rate = sample_rate.to_string();
    let args = [
        OsStr::new("-hide_banner"),
        OsStr::new("-loglevel"),
        OsStr::new("error"),
        OsStr::new("-i"),
        input.as_os_str(),
        OsStr::new("-ar"),
        OsStr::new(&rate),
        OsStr::new("-ac"),
        OsStr::new("1"),
        OsStr::new("-f"),
        OsStr::new("wav"),
        OsStr::new("-y"),
        output.as_os_str(),
    ];
    process::run(ffmpeg, args, None, timeout).await.map(|_| ())
}
