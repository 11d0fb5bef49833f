//! Chunked speech synthesis with word-level timings
//!
//! This crate provides the synthesis pipeline:
//! - Word-bounded text chunking and provider rate limiting
//! - HTTP speech synthesis client
//! - Forced alignment (Montreal Forced Aligner) with estimation fallback
//! - Timing post-processing (script normalization, punctuation filtering)
//! - Progress sessions and the orchestrator tying it together

pub mod alignment;
pub mod audio;
pub mod orchestrator;
pub mod progress;
pub mod timing;
pub mod tts;

mod process;

// Synthesis exports
pub use tts::{
    ChunkerConfig, RateLimiter, SpeechSynthesisClient, SpeechSynthesizer, SynthesisError,
    TextChunker,
};

// Alignment exports
pub use alignment::{
    AlignmentError, AlignmentOutcome, AlignmentScope, DisabledAligner, ForcedAligner,
    InstallationStatus, MfaAligner, SentenceConstraints,
};

pub use audio::{AudioProbe, ContainerProbe};
pub use progress::{ProgressEvent, ProgressRegistry, ProgressSession, ProgressStatus};
pub use timing::{TimingEstimator, TimingPostProcessor};

// Orchestrator exports
pub use orchestrator::{
    ChunkedSpeechOrchestrator, JobState, OrchestratorConfig, PipelineServices, SpeechOutput,
    SpeechRequest,
};

use thiserror::Error;

/// Pipeline errors
///
/// Alignment problems never appear here; they fall back to estimation.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Synthesis failed on chunk {} of {total}: {source}", .chunk + 1)]
    Synthesis {
        chunk: usize,
        total: usize,
        #[source]
        source: SynthesisError,
    },

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the job failed on a repeated HTTP 429
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PipelineError::Synthesis { source, .. } if source.is_rate_limited())
    }
}
