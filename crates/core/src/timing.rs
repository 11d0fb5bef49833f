//! Word-level timing records
//!
//! A `WordTiming` is the unit of output of the whole pipeline: one displayed
//! word, where it starts and ends in the final audio, and where that
//! information came from.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tolerance used when comparing millisecond timestamps
const TIME_EPSILON_MS: f64 = 1e-6;

/// Provenance of a timing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingSource {
    /// Forced alignment over the full, combined audio
    MfaFull,
    /// Forced alignment over a single chunk's audio
    MfaChunk,
    /// Proportional estimate from lexical segmentation
    JiebaEstimation,
}

impl TimingSource {
    /// Whether entries from this source were produced by the forced aligner
    pub fn is_forced_alignment(self) -> bool {
        matches!(self, TimingSource::MfaFull | TimingSource::MfaChunk)
    }

    /// Wire name of the source
    pub fn as_str(self) -> &'static str {
        match self {
            TimingSource::MfaFull => "mfa_full",
            TimingSource::MfaChunk => "mfa_chunk",
            TimingSource::JiebaEstimation => "jieba_estimation",
        }
    }
}

impl std::fmt::Display for TimingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing for a single displayed word
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    /// The word text
    pub word: String,

    /// Start time in milliseconds from the start of the audio
    pub start_time_ms: f64,

    /// End time in milliseconds from the start of the audio
    pub end_time_ms: f64,

    /// `end_time_ms - start_time_ms`
    pub duration_ms: f64,

    /// Where this timing came from
    pub source: TimingSource,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,

    /// True when produced by the forced aligner
    pub is_forced_alignment: bool,

    /// Chunk this word was synthesized in, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<usize>,
}

impl WordTiming {
    /// Create a new timing entry; duration and alignment flag are derived
    pub fn new(
        word: impl Into<String>,
        start_time_ms: f64,
        end_time_ms: f64,
        source: TimingSource,
        confidence: f64,
    ) -> Self {
        Self {
            word: word.into(),
            start_time_ms,
            end_time_ms,
            duration_ms: end_time_ms - start_time_ms,
            source,
            confidence: confidence.clamp(0.0, 1.0),
            is_forced_alignment: source.is_forced_alignment(),
            chunk_id: None,
        }
    }

    /// Create an estimated entry (zero confidence)
    pub fn estimated(word: impl Into<String>, start_time_ms: f64, end_time_ms: f64) -> Self {
        Self::new(word, start_time_ms, end_time_ms, TimingSource::JiebaEstimation, 0.0)
    }

    /// Tag with a chunk id
    pub fn with_chunk_id(mut self, chunk_id: usize) -> Self {
        self.chunk_id = Some(chunk_id);
        self
    }

    /// Replace the word text, keeping the timing
    pub fn with_word(mut self, word: impl Into<String>) -> Self {
        self.word = word.into();
        self
    }

    /// Copy shifted by `offset_ms` on the global timeline
    pub fn shifted(&self, offset_ms: f64) -> Self {
        let mut shifted = self.clone();
        shifted.start_time_ms += offset_ms;
        shifted.end_time_ms += offset_ms;
        shifted
    }

    /// Copy with both boundaries multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        let mut scaled = self.clone();
        scaled.start_time_ms *= factor;
        scaled.end_time_ms *= factor;
        scaled.duration_ms = scaled.end_time_ms - scaled.start_time_ms;
        scaled
    }

    /// Recompute `duration_ms` from the boundaries
    pub fn refresh_duration(&mut self) {
        self.duration_ms = self.end_time_ms - self.start_time_ms;
    }
}

/// Single span covering a whole chunk's audio, as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CoarseTiming {
    pub start_ms: f64,
    pub end_ms: f64,
}

impl CoarseTiming {
    pub fn new(start_ms: f64, end_ms: f64) -> Self {
        Self { start_ms, end_ms }
    }

    /// Span starting at zero
    pub fn spanning(duration_ms: f64) -> Self {
        Self::new(0.0, duration_ms)
    }

    pub fn duration_ms(&self) -> f64 {
        (self.end_ms - self.start_ms).max(0.0)
    }
}

/// Check that a finalized sequence is well formed
///
/// Every entry must have finite, non-negative-length bounds and a confidence
/// in `[0, 1]`; consecutive entries must be non-decreasing by start and must
/// not overlap.
pub fn validate_sequence(timings: &[WordTiming]) -> Result<()> {
    for (index, timing) in timings.iter().enumerate() {
        if !timing.start_time_ms.is_finite() || !timing.end_time_ms.is_finite() {
            return Err(Error::InvalidTiming {
                index,
                reason: "non-finite boundary".to_string(),
            });
        }
        if timing.end_time_ms + TIME_EPSILON_MS < timing.start_time_ms {
            return Err(Error::InvalidTiming {
                index,
                reason: format!(
                    "end {} before start {}",
                    timing.end_time_ms, timing.start_time_ms
                ),
            });
        }
        if !(0.0..=1.0).contains(&timing.confidence) {
            return Err(Error::InvalidTiming {
                index,
                reason: format!("confidence {} outside [0, 1]", timing.confidence),
            });
        }
    }

    for (index, pair) in timings.windows(2).enumerate() {
        let (prev, cur) = (&pair[0], &pair[1]);
        if cur.start_time_ms + TIME_EPSILON_MS < prev.start_time_ms {
            return Err(Error::BrokenSequence {
                previous: index,
                index: index + 1,
                reason: "start times decrease".to_string(),
            });
        }
        if prev.end_time_ms > cur.start_time_ms + TIME_EPSILON_MS {
            return Err(Error::BrokenSequence {
                previous: index,
                index: index + 1,
                reason: format!(
                    "entry ends at {} after next starts at {}",
                    prev.end_time_ms, cur.start_time_ms
                ),
            });
        }
    }

    Ok(())
}
