//! Forced alignment
//!
//! Word-level timestamps from audio plus a known transcript. The aligner is
//! optional: callers get an `AlignmentOutcome` and fall back to estimation
//! when it is anything other than `Aligned`.

mod mfa;
mod textgrid;
mod transcript;

pub use mfa::MfaAligner;
pub use textgrid::{parse_textgrid, TextGridInterval};
pub use transcript::prepare_alignment_transcript;

use karaoke_tts_core::WordTiming;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Alignment errors
///
/// Both variants are recoverable; the orchestrator never surfaces them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    /// Tool, acoustic model or dictionary missing
    #[error("Forced aligner unavailable: {0}")]
    Unavailable(String),

    /// Subprocess error, timeout or missing output
    #[error("Forced alignment failed: {0}")]
    Failure(String),
}

/// Result of one alignment attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentOutcome {
    Aligned(Vec<WordTiming>),
    Unavailable(String),
    Failed(String),
}

impl AlignmentOutcome {
    pub fn is_aligned(&self) -> bool {
        matches!(self, AlignmentOutcome::Aligned(_))
    }

    pub fn into_result(self) -> Result<Vec<WordTiming>, AlignmentError> {
        match self {
            AlignmentOutcome::Aligned(timings) => Ok(timings),
            AlignmentOutcome::Unavailable(reason) => Err(AlignmentError::Unavailable(reason)),
            AlignmentOutcome::Failed(reason) => Err(AlignmentError::Failure(reason)),
        }
    }
}

/// Which audio an alignment call covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignmentScope {
    /// Full, combined audio
    #[default]
    Full,
    /// One chunk's audio
    Chunk { chunk_id: usize, total_chunks: usize },
}

/// Hints passed along with an alignment request
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SentenceConstraints {
    /// Expected total duration of the audio, used for optional rescaling
    pub expected_duration_ms: Option<f64>,
    pub scope: AlignmentScope,
}

impl SentenceConstraints {
    pub fn full(expected_duration_ms: Option<f64>) -> Self {
        Self {
            expected_duration_ms,
            scope: AlignmentScope::Full,
        }
    }

    pub fn chunk(chunk_id: usize, total_chunks: usize) -> Self {
        Self {
            expected_duration_ms: None,
            scope: AlignmentScope::Chunk {
                chunk_id,
                total_chunks,
            },
        }
    }
}

/// Whether the aligner and its models are installed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationStatus {
    pub tool_installed: bool,
    pub acoustic_model: bool,
    pub dictionary: bool,
    pub ready: bool,
}

/// Forced alignment backend
#[async_trait::async_trait]
pub trait ForcedAligner: Send + Sync {
    /// Tool and required models are present
    async fn is_available(&self) -> bool;

    /// Align `audio` against `text`; never panics, never returns an error type
    async fn align(
        &self,
        audio: &[u8],
        text: &str,
        constraints: &SentenceConstraints,
    ) -> AlignmentOutcome;
}

/// Aligner that is never available
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAligner;

#[async_trait::async_trait]
impl ForcedAligner for DisabledAligner {
    async fn is_available(&self) -> bool {
        false
    }

    async fn align(&self, _: &[u8], _: &str, _: &SentenceConstraints) -> AlignmentOutcome {
        AlignmentOutcome::Unavailable("forced alignment disabled".to_string())
    }
}
