//! Montreal Forced Aligner backend
//!
//! Each call gets its own scratch directory laid out as an MFA corpus:
//!
//! ```text
//! <scratch>/corpus/audio.wav    mono PCM at `alignment.sample_rate`
//! <scratch>/corpus/audio.txt    UTF-8 transcript
//! <scratch>/aligned/audio.TextGrid
//! ```

use std::ffi::OsStr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use karaoke_tts_config::AlignmentConfig;
use karaoke_tts_core::{TimingSource, WordTiming};
use once_cell::sync::OnceCell;
use tempfile::TempDir;

use super::textgrid::{parse_textgrid, TextGridInterval};
use super::transcript::prepare_alignment_transcript;
use super::{
    AlignmentOutcome, AlignmentScope, ForcedAligner, InstallationStatus, SentenceConstraints,
};
use crate::audio::{convert_to_wav, ContainerProbe};
use crate::process::{self, CommandError, CommandOutput};

const CORPUS_DIR: &str = "corpus";
const OUTPUT_DIR: &str = "aligned";
const UTTERANCE: &str = "audio";

#[derive(Debug, Clone, Copy)]
enum ModelKind {
    Acoustic,
    Dictionary,
}

impl ModelKind {
    fn as_str(self) -> &'static str {
        match self {
            ModelKind::Acoustic => "acoustic",
            ModelKind::Dictionary => "dictionary",
        }
    }
}

/// Forced aligner driving the `mfa` command line
#[derive(Debug)]
pub struct MfaAligner {
    config: AlignmentConfig,
    /// Model download is attempted at most once per instance
    download_attempted: AtomicBool,
    /// Set once the tool and both models have been found
    ready: OnceCell<InstallationStatus>,
}

impl MfaAligner {
    pub fn new(config: AlignmentConfig) -> Self {
        Self {
            config,
            download_attempted: AtomicBool::new(false),
            ready: OnceCell::new(),
        }
    }

    async fn mfa(
        &self,
        args: &[&OsStr],
        cwd: Option<&Path>,
        timeout_secs: u64,
    ) -> Result<CommandOutput, CommandError> {
        process::run(
            &self.config.command,
            args.iter().copied(),
            cwd,
            Duration::from_secs(timeout_secs),
        )
        .await
    }

    async fn tool_installed(&self) -> bool {
        match self
            .mfa(&[OsStr::new("version")], None, self.config.probe_timeout_secs)
            .await
        {
            Ok(output) => {
                tracing::debug!(version = output.stdout.trim(), "Forced aligner found");
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "Forced aligner not found");
                false
            }
        }
    }

    async fn model_installed(&self, kind: ModelKind, name: &str) -> bool {
        let args = [OsStr::new("model"), OsStr::new("list"), OsStr::new(kind.as_str())];
        match self
            .mfa(&args, None, self.config.model_list_timeout_secs)
            .await
        {
            Ok(output) => output.stdout.contains(name),
            Err(e) => {
                tracing::debug!(kind = kind.as_str(), error = %e, "Could not list aligner models");
                false
            }
        }
    }

    /// Check the tool and both required models
    pub async fn installation_status(&self) -> InstallationStatus {
        if !self.tool_installed().await {
            return InstallationStatus::default();
        }
        let acoustic_model = self
            .model_installed(ModelKind::Acoustic, &self.config.acoustic_model)
            .await;
        let dictionary = self
            .model_installed(ModelKind::Dictionary, &self.config.dictionary)
            .await;

        InstallationStatus {
            tool_installed: true,
            acoustic_model,
            dictionary,
            ready: acoustic_model && dictionary,
        }
    }

    /// Download whichever required model is missing, then re-check
    pub async fn download_models(&self) -> InstallationStatus {
        let status = self.installation_status().await;
        if !status.tool_installed || status.ready {
            return status;
        }

        let missing = [
            (ModelKind::Acoustic, &self.config.acoustic_model, status.acoustic_model),
            (ModelKind::Dictionary, &self.config.dictionary, status.dictionary),
        ];
        for (kind, name, installed) in missing {
            if installed {
                continue;
            }
            tracing::info!(kind = kind.as_str(), model = %name, "Downloading aligner model");
            let args = [
                OsStr::new("model"),
                OsStr::new("download"),
                OsStr::new(kind.as_str()),
                OsStr::new(name.as_str()),
            ];
            if let Err(e) = self
                .mfa(&args, None, self.config.download_timeout_secs)
                .await
            {
                tracing::warn!(
                    kind = kind.as_str(),
                    model = %name,
                    error = %e,
                    "Aligner model download failed"
                );
            }
        }

        self.installation_status().await
    }

    async fn unavailable_reason(&self) -> Option<String> {
        if self.ready.get().is_some() {
            return None;
        }

        let mut status = self.installation_status().await;
        if !status.ready
            && status.tool_installed
            && self.config.download_missing_models
            && !self.download_attempted.swap(true, Ordering::SeqCst)
        {
            status = self.download_models().await;
        }

        if status.ready {
            let _ = self.ready.set(status);
            None
        } else if !status.tool_installed {
            Some(format!("{} is not installed", self.config.command))
        } else if !status.acoustic_model {
            Some(format!("acoustic model {} is not installed", self.config.acoustic_model))
        } else {
            Some(format!("dictionary {} is not installed", self.config.dictionary))
        }
    }

    fn scratch_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("karaoke-mfa-");
        match &self.config.scratch_dir {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    async fn run_alignment(
        &self,
        audio: &[u8],
        transcript: &str,
    ) -> Result<Vec<TextGridInterval>, String> {
        let scratch = self
            .scratch_dir()
            .map_err(|e| format!("could not create scratch directory: {e}"))?;
        let corpus = scratch.path().join(CORPUS_DIR);
        let output = scratch.path().join(OUTPUT_DIR);
        tokio::fs::create_dir_all(&corpus)
            .await
            .map_err(|e| format!("could not create corpus directory: {e}"))?;

        let extension = if ContainerProbe::wav_duration_ms(audio).is_some() {
            "wav"
        } else {
            "mp3"
        };
        let input = scratch.path().join(format!("input.{extension}"));
        tokio::fs::write(&input, audio)
            .await
            .map_err(|e| format!("could not write audio: {e}"))?;

        let wav = corpus.join(format!("{UTTERANCE}.wav"));
        if let Err(e) = convert_to_wav(
            &self.config.ffmpeg_command,
            &input,
            &wav,
            self.config.sample_rate,
            Duration::from_secs(self.config.timeout_secs),
        )
        .await
        {
            tracing::warn!(
                error = %e,
                "Audio conversion failed, handing original audio to the aligner"
            );
            tokio::fs::copy(&input, corpus.join(format!("{UTTERANCE}.{extension}")))
                .await
                .map_err(|e| format!("could not copy audio into corpus: {e}"))?;
        }

        tokio::fs::write(corpus.join(format!("{UTTERANCE}.txt")), transcript)
            .await
            .map_err(|e| format!("could not write transcript: {e}"))?;

        let args = [
            OsStr::new("align"),
            corpus.as_os_str(),
            OsStr::new(&self.config.dictionary),
            OsStr::new(&self.config.acoustic_model),
            output.as_os_str(),
            OsStr::new("--clean"),
        ];
        let result = self
            .mfa(&args, Some(scratch.path()), self.config.timeout_secs)
            .await
            .map_err(|e| e.to_string())?;
        if !result.stderr.trim().is_empty() {
            tracing::debug!(stderr = result.stderr.trim(), "Aligner diagnostics");
        }

        let textgrid = output.join(format!("{UTTERANCE}.TextGrid"));
        let content = tokio::fs::read_to_string(&textgrid)
            .await
            .map_err(|_| "aligner produced no TextGrid".to_string())?;

        Ok(parse_textgrid(&content))
    }

    fn build_timings(
        &self,
        intervals: Vec<TextGridInterval>,
        constraints: &SentenceConstraints,
    ) -> Vec<WordTiming> {
        let (source, confidence, chunk_id) = match constraints.scope {
            AlignmentScope::Full => (TimingSource::MfaFull, self.config.full_confidence, None),
            AlignmentScope::Chunk { chunk_id, .. } => {
                (TimingSource::MfaChunk, self.config.chunk_confidence, Some(chunk_id))
            }
        };

        let mut timings: Vec<WordTiming> = intervals
            .into_iter()
            .map(|interval| {
                let timing = WordTiming::new(
                    interval.text,
                    interval.start_ms,
                    interval.end_ms,
                    source,
                    confidence,
                );
                match chunk_id {
                    Some(id) => timing.with_chunk_id(id),
                    None => timing,
                }
            })
            .collect();

        if self.config.rescale_to_expected_duration {
            let expected = constraints.expected_duration_ms.unwrap_or(0.0);
            let last_end = timings.last().map(|t| t.end_time_ms).unwrap_or(0.0);
            if expected > 0.0 && last_end > 0.0 {
                let factor = expected / last_end;
                tracing::debug!(factor, expected_ms = expected, "Rescaling alignment output");
                timings = timings.iter().map(|t| t.scaled(factor)).collect();
            }
        }

        timings
    }
}

#[async_trait::async_trait]
impl ForcedAligner for MfaAligner {
    async fn is_available(&self) -> bool {
        self.config.enabled && self.unavailable_reason().await.is_none()
    }

    async fn align(
        &self,
        audio: &[u8],
        text: &str,
        constraints: &SentenceConstraints,
    ) -> AlignmentOutcome {
        if !self.config.enabled {
            return AlignmentOutcome::Unavailable("forced alignment disabled".to_string());
        }
        if let Some(reason) = self.unavailable_reason().await {
            return AlignmentOutcome::Unavailable(reason);
        }
        if audio.is_empty() {
            return AlignmentOutcome::Failed("no audio".to_string());
        }

        let transcript = prepare_alignment_transcript(text);
        if transcript.is_empty() {
            return AlignmentOutcome::Failed("transcript has nothing to align".to_string());
        }

        let started = std::time::Instant::now();
        match self.run_alignment(audio, &transcript).await {
            Ok(intervals) if intervals.is_empty() => {
                AlignmentOutcome::Failed("aligner returned no word intervals".to_string())
            }
            Ok(intervals) => {
                let timings = self.build_timings(intervals, constraints);
                tracing::info!(
                    words = timings.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    scope = ?constraints.scope,
                    "Forced alignment complete"
                );
                AlignmentOutcome::Aligned(timings)
            }
            Err(reason) => AlignmentOutcome::Failed(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_tool() -> AlignmentConfig {
        AlignmentConfig {
            command: "karaoke-tts-missing-mfa".to_string(),
            ..Default::default()
        }
    }

    fn intervals() -> Vec<TextGridInterval> {
        vec![
            TextGridInterval {
                text: "你好".to_string(),
                start_ms: 0.0,
                end_ms: 400.0,
            },
            TextGridInterval {
                text: "世界".to_string(),
                start_ms: 400.0,
                end_ms: 1000.0,
            },
        ]
    }

    #[tokio::test]
    async fn test_missing_tool_is_unavailable() {
        let aligner = MfaAligner::new(missing_tool());
        assert!(!aligner.is_available().await);
        assert_eq!(aligner.installation_status().await, InstallationStatus::default());

        let outcome = aligner
            .align(b"audio", "你好世界", &SentenceConstraints::default())
            .await;
        assert!(matches!(outcome, AlignmentOutcome::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_disabled_is_unavailable() {
        let aligner = MfaAligner::new(AlignmentConfig {
            enabled: false,
            ..missing_tool()
        });
        let outcome = aligner.align(b"audio", "你好", &SentenceConstraints::default()).await;
        assert_eq!(
            outcome,
            AlignmentOutcome::Unavailable("forced alignment disabled".to_string())
        );
    }

    #[test]
    fn test_scope_tagging() {
        let aligner = MfaAligner::new(missing_tool());

        let full = aligner.build_timings(intervals(), &SentenceConstraints::full(None));
        assert!(full.iter().all(|t| t.source == TimingSource::MfaFull));
        assert!(full.iter().all(|t| t.is_forced_alignment && t.chunk_id.is_none()));
        assert!((full[0].confidence - 0.85).abs() < 1e-9);

        let chunk = aligner.build_timings(intervals(), &SentenceConstraints::chunk(2, 4));
        assert!(chunk.iter().all(|t| t.source == TimingSource::MfaChunk));
        assert!(chunk.iter().all(|t| t.chunk_id == Some(2)));
        assert!((chunk[1].confidence - 0.95).abs() < 1e-9);
    }

    const WORDS_TEXTGRID: &str = r#"File type = "ooTextFile"
Object class = "TextGrid"

xmin = 0
xmax = 1.2
tiers? <exists>
size = 2
item []:
    item [1]:
        class = "IntervalTier"
        name = "words"
        xmin = 0
        xmax = 1.2
        intervals: size = 4
        intervals [1]:
            xmin = 0
            xmax = 0.5
            text = "劇本"
        intervals [2]:
            xmin = 0.5
            xmax = 0.6
            text = ""
        intervals [3]:
            xmin = 0.6
            xmax = 1.0
            text = "很好"
        intervals [4]:
            xmin = 1.0
            xmax = 1.2
            text = "sil"
    item [2]:
        class = "IntervalTier"
        name = "phones"
        xmin = 0
        xmax = 1.2
        intervals: size = 1
        intervals [1]:
            xmin = 0
            xmax = 0.2
            text = "j"
"#;

    /// Stand-in `mfa` executable; `mode` decides what `mfa align` does
    #[cfg(unix)]
    fn fake_mfa(mode: &str) -> (tempfile::TempDir, MfaAligner) {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().display().to_string();
        std::fs::write(dir.path().join("fixture.TextGrid"), WORDS_TEXTGRID).unwrap();

        let script = format!(
            r#"#!/bin/sh
echo "$1" >> "{root}/calls.log"
case "$1" in
  version) echo "3.1.0" ;;
  model) echo "mandarin_mfa" ;;
  align)
    ls "$2" > "{root}/corpus.txt"
    cp "$2/audio.txt" "{root}/transcript.txt"
    case "{mode}" in
      ok) mkdir -p "$5" && cp "{root}/fixture.TextGrid" "$5/audio.TextGrid" ;;
      fail) echo boom >&2; exit 3 ;;
      sleep) sleep 5 ;;
    esac
    ;;
esac
"#
        );
        let command = dir.path().join("mfa");
        std::fs::write(&command, script).unwrap();
        std::fs::set_permissions(&command, std::fs::Permissions::from_mode(0o755)).unwrap();

        let aligner = MfaAligner::new(AlignmentConfig {
            command: command.display().to_string(),
            acoustic_model: "mandarin_mfa".to_string(),
            dictionary: "mandarin_mfa".to_string(),
            ffmpeg_command: "karaoke-tts-missing-ffmpeg".to_string(),
            timeout_secs: 1,
            scratch_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        });
        (dir, aligner)
    }

    #[cfg(unix)]
    async fn align_with(mode: &str) -> (tempfile::TempDir, AlignmentOutcome) {
        let (dir, aligner) = fake_mfa(mode);
        let outcome = aligner
            .align(b"ID3fake-mp3", "劇本，★很好！", &SentenceConstraints::full(None))
            .await;
        (dir, outcome)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_align_reads_words_tier() {
        let (dir, outcome) = align_with("ok").await;
        let timings = outcome.into_result().unwrap();

        let words: Vec<&str> = timings.iter().map(|t| t.word.as_str()).collect();
        assert_eq!(words, vec!["劇本", "很好"]);
        assert!(timings.iter().all(|t| t.source == TimingSource::MfaFull));
        assert!((timings[0].end_time_ms - 500.0).abs() < 1e-6);
        assert!((timings[1].start_time_ms - 600.0).abs() < 1e-6);
        assert!((timings[1].end_time_ms - 1000.0).abs() < 1e-6);

        // ffmpeg is missing, so the original audio is copied into the corpus
        let corpus = std::fs::read_to_string(dir.path().join("corpus.txt")).unwrap();
        assert_eq!(corpus.lines().collect::<Vec<_>>(), vec!["audio.mp3", "audio.txt"]);
        let transcript = std::fs::read_to_string(dir.path().join("transcript.txt")).unwrap();
        assert_eq!(transcript, "劇本，很好！");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_align_command_failure() {
        let (_dir, outcome) = align_with("fail").await;
        match outcome {
            AlignmentOutcome::Failed(reason) => assert!(reason.contains("boom"), "{reason}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_align_timeout() {
        let (_dir, outcome) = align_with("sleep").await;
        match outcome {
            AlignmentOutcome::Failed(reason) => assert!(reason.contains("timed out"), "{reason}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_align_without_textgrid() {
        let (_dir, outcome) = align_with("nogrid").await;
        assert_eq!(
            outcome,
            AlignmentOutcome::Failed("aligner produced no TextGrid".to_string())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_availability_checked_once() {
        let (dir, aligner) = fake_mfa("ok");
        for _ in 0..2 {
            let outcome = aligner
                .align(b"ID3fake-mp3", "很好", &SentenceConstraints::full(None))
                .await;
            assert!(outcome.is_aligned());
        }
        assert!(aligner.is_available().await);

        let log = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
        let calls: Vec<&str> = log.lines().collect();
        assert_eq!(calls.iter().filter(|c| **c == "version").count(), 1);
        assert_eq!(calls.iter().filter(|c| **c == "model").count(), 2);
        assert_eq!(calls.iter().filter(|c| **c == "align").count(), 2);
    }

    #[test]
    fn test_rescale_is_opt_in() {
        let constraints = SentenceConstraints::full(Some(2000.0));

        let plain = MfaAligner::new(missing_tool()).build_timings(intervals(), &constraints);
        assert_eq!(plain[1].end_time_ms, 1000.0);

        let rescaling = MfaAligner::new(AlignmentConfig {
            rescale_to_expected_duration: true,
            ..missing_tool()
        });
        let scaled = rescaling.build_timings(intervals(), &constraints);
        assert!((scaled[1].end_time_ms - 2000.0).abs() < 1e-9);
        assert!((scaled[0].duration_ms - 800.0).abs() < 1e-9);
    }
}
