use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use karaoke_tts_config::{RateLimitConfig, VoiceInfo};
use karaoke_tts_core::{CoarseTiming, SynthesisResult, TimingSource, WordTiming};
use karaoke_tts_pipeline::{
    AlignmentOutcome, AlignmentScope, AudioProbe, ChunkedSpeechOrchestrator, ChunkerConfig,
    DisabledAligner, ForcedAligner, JobState, OrchestratorConfig, PipelineError,
    PipelineServices, ProgressRegistry, ProgressStatus, RateLimiter, SentenceConstraints,
    SpeechRequest, SpeechSynthesizer, SynthesisError,
};
use karaoke_tts_text_processing::{CharTable, ScriptNormalizer, Segmenter};

const VOICE: &str = "test_voice";
/// Fake audio: 16 bytes per millisecond
const BYTES_PER_CHUNK: usize = 16_000;

enum Reply {
    Audio,
    RateLimited,
    ServerError,
}

struct FakeSynthesizer {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    configured: bool,
}

impl FakeSynthesizer {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            configured: true,
        }
    }

    fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new(Vec::new())
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(
        &self,
        _text: &str,
        _voice: &str,
        _speed: f32,
        _volume: f32,
    ) -> Result<SynthesisResult, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.lock().pop_front().unwrap_or(Reply::Audio) {
            Reply::Audio => Ok(SynthesisResult::new(
                vec![0u8; BYTES_PER_CHUNK],
                CoarseTiming::spanning(1000.0),
            )),
            Reply::RateLimited => Err(SynthesisError::RateLimited),
            Reply::ServerError => Err(SynthesisError::HttpStatus {
                status: 500,
                body: "internal".to_string(),
            }),
        }
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn default_voice(&self) -> &str {
        VOICE
    }

    fn supported_voices(&self) -> Vec<VoiceInfo> {
        vec![VoiceInfo {
            id: VOICE.to_string(),
            name: "Test".to_string(),
            language: "zh".to_string(),
        }]
    }
}

/// Aligner that "aligns" every segmented word at 100 ms intervals
#[derive(Default)]
struct FakeAligner {
    calls: Mutex<Vec<SentenceConstraints>>,
}

#[async_trait::async_trait]
impl ForcedAligner for FakeAligner {
    async fn is_available(&self) -> bool {
        true
    }

    async fn align(
        &self,
        _audio: &[u8],
        text: &str,
        constraints: &SentenceConstraints,
    ) -> AlignmentOutcome {
        self.calls.lock().push(*constraints);
        let timings = Segmenter::new()
            .words(text)
            .into_iter()
            .enumerate()
            .map(|(i, word)| {
                let start = i as f64 * 100.0;
                WordTiming::new(word, start, start + 100.0, TimingSource::MfaFull, 0.85)
            })
            .collect();
        AlignmentOutcome::Aligned(timings)
    }
}

struct LengthProbe;

#[async_trait::async_trait]
impl AudioProbe for LengthProbe {
    async fn duration_ms(&self, audio: &[u8]) -> f64 {
        audio.len() as f64 / 16.0
    }
}

fn build_orchestrator(
    synthesizer: Arc<FakeSynthesizer>,
    aligner: Arc<dyn ForcedAligner>,
    max_words: usize,
) -> ChunkedSpeechOrchestrator {
    let services = PipelineServices {
        synthesizer,
        aligner,
        probe: Arc::new(LengthProbe),
        rate_limiter: Arc::new(RateLimiter::new(RateLimitConfig::default())),
        normalizer: Arc::new(ScriptNormalizer::new(None, CharTable::embedded().clone())),
        progress: Arc::new(ProgressRegistry::default()),
    };
    let config = OrchestratorConfig {
        chunker: ChunkerConfig {
            max_words,
            ..ChunkerConfig::default()
        },
        ..OrchestratorConfig::default()
    };
    ChunkedSpeechOrchestrator::new(config, services)
}

/// 30 words, three chunks at ten words each
fn three_chunk_text() -> String {
    "我们。".repeat(15)
}

#[tokio::test]
async fn unavailable_aligner_falls_back_to_estimation() {
    let synthesizer = Arc::new(FakeSynthesizer::new(vec![]));
    let orchestrator = build_orchestrator(synthesizer.clone(), Arc::new(DisabledAligner), 120);

    let output = orchestrator
        .generate(SpeechRequest::new("你好，世界。今天天气很好。"))
        .await
        .expect("job succeeds");

    assert_eq!(synthesizer.calls(), 1);
    assert_eq!(output.chunk_count, 1);
    assert!(!output.timings.is_empty());
    assert!(output
        .timings
        .iter()
        .all(|t| t.source == TimingSource::JiebaEstimation && !t.is_forced_alignment));
    assert!(output.timings.iter().all(|t| t.word != "，" && t.word != "。"));
    assert!(output.states.contains(&JobState::AlignOrEstimate));
    assert_eq!(output.states.last(), Some(&JobState::Done));

    let session = orchestrator.progress().get(&output.session_id).unwrap();
    assert_eq!(session.status, ProgressStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn final_alignment_replaces_chunk_estimates() {
    let synthesizer = Arc::new(FakeSynthesizer::new(vec![]));
    let aligner = Arc::new(FakeAligner::default());
    let orchestrator = build_orchestrator(synthesizer.clone(), aligner.clone(), 10);

    let output = orchestrator
        .generate(SpeechRequest::new(three_chunk_text()))
        .await
        .expect("job succeeds");

    assert_eq!(output.chunk_count, 3);
    assert_eq!(synthesizer.calls(), 3);
    assert_eq!(output.audio.len(), 3 * BYTES_PER_CHUNK);
    assert_eq!(output.duration_ms, 3000.0);

    // Only the combined pass runs, over the full measured duration
    let calls = aligner.calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].scope, AlignmentScope::Full);
    assert_eq!(calls[0].expected_duration_ms, Some(3000.0));

    assert_eq!(output.timings.len(), 15);
    assert!(output.timings.iter().all(|t| t.is_forced_alignment));
    assert!(output.timings.iter().all(|t| t.chunk_id.is_none()));

    let waits = output
        .states
        .iter()
        .filter(|s| **s == JobState::RateLimitWait)
        .count();
    assert_eq!(waits, 3);
    assert!(output.states.contains(&JobState::FinalAlignPass));
    assert!(output.states.contains(&JobState::SelectTimings));
}

#[tokio::test(start_paused = true)]
async fn chunk_estimates_follow_measured_offsets() {
    let synthesizer = Arc::new(FakeSynthesizer::new(vec![]));
    let orchestrator = build_orchestrator(synthesizer, Arc::new(DisabledAligner), 10);

    let output = orchestrator
        .generate(SpeechRequest::new(three_chunk_text()))
        .await
        .expect("job succeeds");

    assert_eq!(output.timings.len(), 15);
    assert!(output.timings.iter().all(|t| !t.is_forced_alignment));

    let second_chunk: Vec<&WordTiming> = output
        .timings
        .iter()
        .filter(|t| t.chunk_id == Some(1))
        .collect();
    assert_eq!(second_chunk.len(), 5);
    assert_eq!(second_chunk[0].start_time_ms, 1000.0);
    assert!(second_chunk.iter().all(|t| t.end_time_ms <= 2000.0 + 1e-6));

    for pair in output.timings.windows(2) {
        assert!(pair[0].end_time_ms <= pair[1].start_time_ms + 1e-6);
    }
}

#[tokio::test(start_paused = true)]
async fn single_429_is_retried_after_cooldown() {
    let synthesizer = Arc::new(FakeSynthesizer::new(vec![Reply::RateLimited]));
    let orchestrator = build_orchestrator(synthesizer.clone(), Arc::new(DisabledAligner), 120);

    let started = tokio::time::Instant::now();
    let output = orchestrator
        .generate(SpeechRequest::new("你好，世界。"))
        .await
        .expect("retry succeeds");

    assert_eq!(synthesizer.calls(), 2);
    assert!(started.elapsed() >= std::time::Duration::from_secs(20));
    assert!(!output.timings.is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_429_aborts_the_job() {
    let synthesizer = Arc::new(FakeSynthesizer::new(vec![
        Reply::Audio,
        Reply::RateLimited,
        Reply::RateLimited,
    ]));
    let orchestrator = build_orchestrator(synthesizer.clone(), Arc::new(DisabledAligner), 10);
    let mut events = orchestrator.progress().subscribe();

    let err = orchestrator
        .generate(SpeechRequest::new(three_chunk_text()))
        .await
        .unwrap_err();

    assert!(err.is_rate_limited());
    assert!(matches!(err, PipelineError::Synthesis { chunk: 1, total: 3, .. }));
    assert_eq!(synthesizer.calls(), 3);

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        last = Some(event);
    }
    let last = last.expect("progress events");
    assert_eq!(last.status, ProgressStatus::Error);
    assert!(last.error.is_some());
}

#[tokio::test(start_paused = true)]
async fn other_synthesis_errors_abort_without_retry() {
    let synthesizer = Arc::new(FakeSynthesizer::new(vec![Reply::Audio, Reply::ServerError]));
    let orchestrator = build_orchestrator(synthesizer.clone(), Arc::new(FakeAligner::default()), 10);

    let err = orchestrator
        .generate(SpeechRequest::new(three_chunk_text()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Synthesis {
            chunk: 1,
            source: SynthesisError::HttpStatus { status: 500, .. },
            ..
        }
    ));
    // Chunk three is never attempted
    assert_eq!(synthesizer.calls(), 2);
}

#[tokio::test]
async fn configuration_errors_fail_before_any_work() {
    let synthesizer = Arc::new(FakeSynthesizer::unconfigured());
    let orchestrator = build_orchestrator(synthesizer.clone(), Arc::new(DisabledAligner), 120);
    let err = orchestrator
        .generate(SpeechRequest::new("你好"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
    assert_eq!(synthesizer.calls(), 0);
    assert_eq!(orchestrator.progress().count(), 0);

    let synthesizer = Arc::new(FakeSynthesizer::new(vec![]));
    let orchestrator = build_orchestrator(synthesizer.clone(), Arc::new(DisabledAligner), 120);
    let err = orchestrator
        .generate(SpeechRequest::new("你好").with_voice("nobody"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));

    let err = orchestrator
        .generate(SpeechRequest::new("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
    assert_eq!(synthesizer.calls(), 0);
}

#[tokio::test]
async fn align_audio_estimates_over_probed_duration() {
    let synthesizer = Arc::new(FakeSynthesizer::new(vec![]));
    let orchestrator = build_orchestrator(synthesizer, Arc::new(DisabledAligner), 120);

    let timings = orchestrator
        .align_audio(&vec![0u8; 32_000], "我们 今天 去 公园")
        .await;
    assert_eq!(timings.len(), 4);
    let end = timings.last().map(|t| t.end_time_ms).unwrap();
    assert!((end - 2000.0).abs() < 1e-6);
}
