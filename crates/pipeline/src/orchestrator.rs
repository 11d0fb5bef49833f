//! Chunked speech orchestrator
//!
//! Drives one synthesis job from input text to finished audio and word
//! timings. Chunks are processed strictly in order; any unrecoverable error
//! aborts the whole job and nothing partial is returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use karaoke_tts_config::{EstimationConfig, Settings};
use karaoke_tts_core::{CoarseTiming, SynthesisResult, WordTiming};
use karaoke_tts_text_processing::{script::default_engine, CharTable, ScriptNormalizer};
use serde::Serialize;
use tracing::Instrument;

use crate::alignment::{ForcedAligner, MfaAligner, SentenceConstraints};
use crate::audio::{concat_audio, AudioProbe, ContainerProbe};
use crate::progress::{ProgressRegistry, ProgressStatus};
use crate::timing::{adjust_offsets, TimingEstimator, TimingPostProcessor};
use crate::tts::{ChunkerConfig, RateLimiter, SpeechSynthesisClient, SpeechSynthesizer, TextChunker};
use crate::PipelineError;

/// Job states, in the order a job can pass through them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Init,
    RateLimitWait,
    Synthesize,
    /// Single chunk: forced alignment with estimation fallback
    AlignOrEstimate,
    /// Multi chunk: temporary per-chunk estimate
    Estimate,
    CombineAudio,
    FinalAlignPass,
    SelectTimings,
    Finalize,
    Done,
    Error,
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub chunker: ChunkerConfig,
    pub estimation: EstimationConfig,
    pub default_speed: f32,
    pub default_volume: f32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            estimation: EstimationConfig::default(),
            default_speed: 1.0,
            default_volume: 0.8,
        }
    }
}

impl From<&Settings> for OrchestratorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            chunker: ChunkerConfig::from(&settings.chunking),
            estimation: settings.estimation.clone(),
            default_speed: settings.synthesis.default_speed,
            default_volume: settings.synthesis.default_volume,
        }
    }
}

/// Collaborators shared by every job
///
/// The rate limiter, normalizer and progress registry are process-wide;
/// jobs sharing a rate limiter share its pacing baseline.
#[derive(Clone)]
pub struct PipelineServices {
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub aligner: Arc<dyn ForcedAligner>,
    pub probe: Arc<dyn AudioProbe>,
    pub rate_limiter: Arc<RateLimiter>,
    pub normalizer: Arc<ScriptNormalizer>,
    pub progress: Arc<ProgressRegistry>,
}

impl PipelineServices {
    /// Production services built from settings
    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        let synthesizer = SpeechSynthesisClient::new(settings.synthesis.clone())
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        let table = match &settings.script.table_path {
            Some(path) => CharTable::from_path(path).map_err(|e| {
                PipelineError::Configuration(format!(
                    "character table {}: {}",
                    path.display(),
                    e
                ))
            })?,
            None => CharTable::embedded().clone(),
        };
        let engine = if settings.script.engine_enabled {
            default_engine()
        } else {
            None
        };

        Ok(Self {
            synthesizer: Arc::new(synthesizer),
            aligner: Arc::new(MfaAligner::new(settings.alignment.clone())),
            probe: Arc::new(
                ContainerProbe::new(settings.audio.clone())
                    .with_extension(settings.synthesis.format.clone()),
            ),
            rate_limiter: Arc::new(RateLimiter::new(settings.rate_limit.clone())),
            normalizer: Arc::new(ScriptNormalizer::new(engine, table)),
            progress: Arc::new(ProgressRegistry::new(settings.progress.clone())),
        })
    }
}

/// A synthesis job
#[derive(Debug, Clone, Default)]
pub struct SpeechRequest {
    /// Cleaned input text
    pub text: String,
    /// Defaults to the synthesizer's default voice
    pub voice: Option<String>,
    pub speed: Option<f32>,
    pub volume: Option<f32>,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }
}

/// Finished job
#[derive(Debug, Clone, Serialize)]
pub struct SpeechOutput {
    pub session_id: String,
    #[serde(skip)]
    pub audio: Vec<u8>,
    /// Container format of `audio`
    pub format: String,
    pub timings: Vec<WordTiming>,
    pub chunk_count: usize,
    /// Measured duration of the combined audio
    pub duration_ms: f64,
    /// States the job passed through
    pub states: Vec<JobState>,
}

impl SpeechOutput {
    /// Write `audio.<format>` and `timings.json` into `dir`
    pub async fn write_to_dir(&self, dir: &Path) -> Result<(PathBuf, PathBuf), PipelineError> {
        tokio::fs::create_dir_all(dir).await?;
        let audio_path = dir.join(format!("audio.{}", self.format));
        let timings_path = dir.join("timings.json");

        tokio::fs::write(&audio_path, &self.audio).await?;
        let json = serde_json::to_vec_pretty(&self.timings).map_err(std::io::Error::from)?;
        tokio::fs::write(&timings_path, json).await?;

        Ok((audio_path, timings_path))
    }
}

struct Job<'a> {
    session_id: &'a str,
    text: &'a str,
    voice: &'a str,
    speed: f32,
    volume: f32,
    states: Vec<JobState>,
}

impl Job<'_> {
    fn enter(&mut self, state: JobState) {
        tracing::trace!(?state, "Job state");
        self.states.push(state);
    }
}

/// Chunked speech synthesis with forced-alignment timings
pub struct ChunkedSpeechOrchestrator {
    config: OrchestratorConfig,
    services: PipelineServices,
    chunker: TextChunker,
    estimator: TimingEstimator,
    post_processor: TimingPostProcessor,
}

impl ChunkedSpeechOrchestrator {
    pub fn new(config: OrchestratorConfig, services: PipelineServices) -> Self {
        Self {
            chunker: TextChunker::new(config.chunker.clone()),
            estimator: TimingEstimator::new(config.estimation.clone()),
            post_processor: TimingPostProcessor::new(Arc::clone(&services.normalizer)),
            config,
            services,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        let services = PipelineServices::from_settings(settings)?;
        Ok(Self::new(OrchestratorConfig::from(settings), services))
    }

    pub fn progress(&self) -> &Arc<ProgressRegistry> {
        &self.services.progress
    }

    /// Run a job to completion
    pub async fn generate(&self, request: SpeechRequest) -> Result<SpeechOutput, PipelineError> {
        if request.text.trim().is_empty() {
            return Err(PipelineError::InvalidInput("text is empty".to_string()));
        }

        let synthesizer = &self.services.synthesizer;
        if !synthesizer.is_configured() {
            return Err(PipelineError::Configuration(
                "synthesis API key and group id are required".to_string(),
            ));
        }
        let voice = request
            .voice
            .clone()
            .unwrap_or_else(|| synthesizer.default_voice().to_string());
        if !synthesizer.validate_voice(&voice) {
            return Err(PipelineError::Configuration(format!("unsupported voice: {voice}")));
        }

        let chunks = self.chunker.split_default(&request.text);
        let total_chunks = chunks.len();
        let session_id = self.services.progress.create_session(total_chunks);

        let mut job = Job {
            session_id: &session_id,
            text: &request.text,
            voice: &voice,
            speed: request.speed.unwrap_or(self.config.default_speed),
            volume: request.volume.unwrap_or(self.config.default_volume),
            states: vec![JobState::Init],
        };

        let span = tracing::info_span!("speech_job", session_id = %session_id, total_chunks);
        let result = async {
            tracing::info!(
                chars = request.text.chars().count(),
                voice = %voice,
                "Starting speech generation"
            );
            if total_chunks <= 1 {
                self.run_single(&mut job).await
            } else {
                let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
                self.run_chunked(&mut job, &texts).await
            }
        }
        .instrument(span)
        .await;

        match result {
            Ok((audio, duration_ms, timings)) => {
                job.enter(JobState::Done);
                self.services.progress.complete(
                    &session_id,
                    format!("Generated {} words of timing", timings.len()),
                );
                tracing::info!(
                    session_id = %session_id,
                    words = timings.len(),
                    duration_ms,
                    "Speech generation complete"
                );
                Ok(SpeechOutput {
                    session_id: session_id.clone(),
                    audio,
                    format: synthesizer.audio_format().to_string(),
                    timings,
                    chunk_count: total_chunks,
                    duration_ms,
                    states: job.states,
                })
            }
            Err(e) => {
                job.enter(JobState::Error);
                self.services.progress.error(&session_id, e.to_string());
                tracing::error!(session_id = %session_id, error = %e, "Speech generation failed");
                Err(e)
            }
        }
    }

    async fn synthesize_chunk(
        &self,
        job: &Job<'_>,
        text: &str,
        index: usize,
        total: usize,
    ) -> Result<SynthesisResult, PipelineError> {
        let synthesizer = self.services.synthesizer.as_ref();
        let (voice, speed, volume) = (job.voice, job.speed, job.volume);
        self.services
            .rate_limiter
            .call_with_retry(move || synthesizer.synthesize(text, voice, speed, volume))
            .await
            .map_err(|source| PipelineError::Synthesis {
                chunk: index,
                total,
                source,
            })
    }

    /// Provider-reported span when present, otherwise the measured duration
    fn coarse_for(result: &SynthesisResult, measured_ms: f64) -> CoarseTiming {
        if result.coarse_timing.end_ms > 0.0 {
            result.coarse_timing
        } else {
            CoarseTiming::spanning(measured_ms)
        }
    }

    async fn run_single(
        &self,
        job: &mut Job<'_>,
    ) -> Result<(Vec<u8>, f64, Vec<WordTiming>), PipelineError> {
        self.services.progress.update(
            job.session_id,
            1,
            ProgressStatus::Processing,
            "Generating speech...",
        );

        job.enter(JobState::Synthesize);
        self.services.rate_limiter.pace(0, 1).await;
        let result = self.synthesize_chunk(job, job.text, 0, 1).await?;
        if result.audio_bytes.is_empty() {
            return Err(PipelineError::Audio("synthesis produced no audio".to_string()));
        }
        let duration_ms = self.services.probe.duration_ms(&result.audio_bytes).await;

        job.enter(JobState::AlignOrEstimate);
        let outcome = self
            .services
            .aligner
            .align(
                &result.audio_bytes,
                job.text,
                &SentenceConstraints::full(Some(duration_ms)),
            )
            .await;
        let timings = match outcome.into_result() {
            Ok(aligned) if !aligned.is_empty() => aligned,
            Ok(_) => {
                tracing::warn!("Alignment returned no words, estimating timings");
                self.estimator
                    .estimate(job.text, Some(Self::coarse_for(&result, duration_ms)))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Falling back to estimated timings");
                self.estimator
                    .estimate(job.text, Some(Self::coarse_for(&result, duration_ms)))
            }
        };

        job.enter(JobState::Finalize);
        let timings = self.post_processor.finalize(timings);
        Ok((result.audio_bytes, duration_ms, timings))
    }

    async fn run_chunked(
        &self,
        job: &mut Job<'_>,
        chunks: &[&str],
    ) -> Result<(Vec<u8>, f64, Vec<WordTiming>), PipelineError> {
        let total = chunks.len();
        let progress = &self.services.progress;
        let mut audio_parts = Vec::with_capacity(total);
        let mut estimates = Vec::new();
        let mut offset_ms = 0.0;

        for (index, chunk) in chunks.iter().enumerate() {
            progress.update(
                job.session_id,
                index + 1,
                ProgressStatus::Processing,
                format!("Processing chunk {} of {}", index + 1, total),
            );
            tracing::info!(chunk = index + 1, total_chunks = total, "Processing chunk");

            job.enter(JobState::RateLimitWait);
            self.services.rate_limiter.pace(index, total).await;

            job.enter(JobState::Synthesize);
            let result = self.synthesize_chunk(job, chunk, index, total).await?;

            job.enter(JobState::Estimate);
            let measured_ms = self.services.probe.duration_ms(&result.audio_bytes).await;
            let local: Vec<WordTiming> = self
                .estimator
                .estimate(chunk, Some(Self::coarse_for(&result, measured_ms)))
                .into_iter()
                .map(|t| t.with_chunk_id(index))
                .collect();
            estimates.extend(adjust_offsets(local, offset_ms));

            tracing::debug!(
                chunk = index + 1,
                measured_ms,
                reported_ms = result.reported_duration_ms(),
                offset_ms,
                "Chunk synthesized"
            );
            offset_ms += measured_ms;
            audio_parts.push(result.audio_bytes);
        }

        job.enter(JobState::CombineAudio);
        progress.update(job.session_id, total, ProgressStatus::Combining, "Combining audio...");
        let audio = concat_audio(&audio_parts)
            .map_err(|e| PipelineError::Audio(format!("could not combine chunks: {e}")))?;
        if audio.is_empty() {
            return Err(PipelineError::Audio("synthesis produced no audio".to_string()));
        }

        job.enter(JobState::FinalAlignPass);
        progress.update(
            job.session_id,
            total,
            ProgressStatus::Combining,
            "Running final alignment...",
        );
        tracing::info!(total_duration_ms = offset_ms, "Running final alignment pass");
        let outcome = self
            .services
            .aligner
            .align(&audio, job.text, &SentenceConstraints::full(Some(offset_ms)))
            .await;

        job.enter(JobState::SelectTimings);
        let timings = match outcome.into_result() {
            Ok(aligned) if aligned.iter().any(|t| t.is_forced_alignment) => {
                tracing::info!(
                    words = aligned.len(),
                    replaced = estimates.len(),
                    "Final alignment replaces chunk estimates"
                );
                aligned
            }
            Ok(_) => {
                tracing::warn!("Final alignment produced no aligned words, keeping estimates");
                estimates
            }
            Err(e) => {
                tracing::warn!(error = %e, "Final alignment unavailable, keeping estimates");
                estimates
            }
        };
        progress.update(
            job.session_id,
            total,
            ProgressStatus::Combining,
            "Final alignment finished",
        );

        job.enter(JobState::Finalize);
        let timings = self.post_processor.finalize(timings);
        Ok((audio, offset_ms, timings))
    }

    /// Time existing audio against its transcript
    ///
    /// Falls back to estimation over the measured duration when the aligner
    /// is unavailable or fails.
    pub async fn align_audio(&self, audio: &[u8], text: &str) -> Vec<WordTiming> {
        let duration_ms = self.services.probe.duration_ms(audio).await;
        let outcome = self
            .services
            .aligner
            .align(audio, text, &SentenceConstraints::full(Some(duration_ms)))
            .await;

        let timings = match outcome.into_result() {
            Ok(aligned) if !aligned.is_empty() => aligned,
            Ok(_) => self
                .estimator
                .estimate(text, Some(CoarseTiming::spanning(duration_ms))),
            Err(e) => {
                tracing::warn!(error = %e, "Falling back to estimated timings");
                self.estimator
                    .estimate(text, Some(CoarseTiming::spanning(duration_ms)))
            }
        };
        self.post_processor.finalize(timings)
    }
}
