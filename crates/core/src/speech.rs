//! Chunk and synthesis result types

use serde::{Deserialize, Serialize};

use crate::timing::CoarseTiming;

/// A bounded substring of the input text, synthesized as one API call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Exact slice of the original input
    pub text: String,
    /// Number of lexical words in `text`
    pub word_count: usize,
}

impl TextChunk {
    pub fn new(text: impl Into<String>, word_count: usize) -> Self {
        Self {
            text: text.into(),
            word_count,
        }
    }
}

/// Audio returned by the synthesis provider for one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    /// Encoded audio (container format as requested from the provider)
    pub audio_bytes: Vec<u8>,
    /// Single span covering the whole chunk's audio
    pub coarse_timing: CoarseTiming,
}

impl SynthesisResult {
    pub fn new(audio_bytes: Vec<u8>, coarse_timing: CoarseTiming) -> Self {
        Self {
            audio_bytes,
            coarse_timing,
        }
    }

    /// Provider-reported duration
    pub fn reported_duration_ms(&self) -> f64 {
        self.coarse_timing.duration_ms()
    }
}
