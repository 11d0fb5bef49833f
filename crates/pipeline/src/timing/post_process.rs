//! The single exit gate for timing data
//!
//! Every timing list leaving the pipeline goes through
//! `TimingPostProcessor::finalize`, whatever produced it.

use std::sync::Arc;

use karaoke_tts_core::text::{contains_ideograph, is_punctuation_only};
use karaoke_tts_core::{validate_sequence, WordTiming};
use karaoke_tts_text_processing::ScriptNormalizer;

/// Drop entries that cannot be displayed as a word
///
/// Empty, whitespace-only and punctuation-only words go, as does anything
/// without at least one ideograph. Order is preserved.
pub fn filter_punctuation(timings: Vec<WordTiming>) -> Vec<WordTiming> {
    let before = timings.len();
    let kept: Vec<WordTiming> = timings
        .into_iter()
        .filter(|t| {
            let word = t.word.trim();
            !word.is_empty() && !is_punctuation_only(word) && contains_ideograph(word)
        })
        .collect();

    if kept.len() != before {
        tracing::debug!(
            removed = before - kept.len(),
            kept = kept.len(),
            "Filtered non-word timings"
        );
    }
    kept
}

/// Move a chunk's local timeline onto the global one
pub fn adjust_offsets(timings: Vec<WordTiming>, offset_ms: f64) -> Vec<WordTiming> {
    if offset_ms == 0.0 {
        return timings;
    }
    timings.iter().map(|t| t.shifted(offset_ms)).collect()
}

/// Sort by start, clamp overlaps and recompute durations
///
/// Entries with non-finite bounds are dropped. An entry overlapping its
/// successor has its end pulled back to the successor's start.
pub fn normalize_sequence(mut timings: Vec<WordTiming>) -> Vec<WordTiming> {
    timings.retain(|t| t.start_time_ms.is_finite() && t.end_time_ms.is_finite());
    timings.sort_by(|a, b| a.start_time_ms.total_cmp(&b.start_time_ms));

    for i in 1..timings.len() {
        let next_start = timings[i].start_time_ms;
        let previous = &mut timings[i - 1];
        if previous.end_time_ms > next_start {
            previous.end_time_ms = next_start;
        }
    }

    for timing in &mut timings {
        if timing.end_time_ms < timing.start_time_ms {
            timing.end_time_ms = timing.start_time_ms;
        }
        timing.refresh_duration();
    }

    timings
}

/// Normalizes script, filters and validates finished timing lists
#[derive(Debug, Clone)]
pub struct TimingPostProcessor {
    normalizer: Arc<ScriptNormalizer>,
}

impl TimingPostProcessor {
    pub fn new(normalizer: Arc<ScriptNormalizer>) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &Arc<ScriptNormalizer> {
        &self.normalizer
    }

    /// Script normalization, filtering, sequence normalization, then a log-only script check
    pub fn finalize(&self, timings: Vec<WordTiming>) -> Vec<WordTiming> {
        let input = timings.len();
        let converted = self.normalizer.convert_word_timings(timings);
        let filtered = filter_punctuation(converted);
        let finalized = normalize_sequence(filtered);

        self.normalizer.validate_simplified(&finalized);
        if let Err(e) = validate_sequence(&finalized) {
            tracing::error!(error = %e, "Finalized timings are not a valid sequence");
        }

        tracing::debug!(input, output = finalized.len(), "Finalized word timings");
        finalized
    }
}
