//! Proportional timing estimation
//!
//! Always available. Used for per-chunk progress timings and whenever forced
//! alignment is unavailable or fails.

use karaoke_tts_config::EstimationConfig;
use karaoke_tts_core::{CoarseTiming, WordTiming};
use karaoke_tts_text_processing::Segmenter;

/// Estimates word timings from character counts
#[derive(Debug, Clone, Default)]
pub struct TimingEstimator {
    config: EstimationConfig,
    segmenter: Segmenter,
}

impl TimingEstimator {
    pub fn new(config: EstimationConfig) -> Self {
        Self {
            config,
            segmenter: Segmenter::new(),
        }
    }

    /// Lay out every segmented word of `text` contiguously from zero
    ///
    /// The total is the coarse end time when known and positive, otherwise
    /// `default_word_ms` per word. Empty input yields an empty list.
    pub fn estimate(&self, text: &str, coarse: Option<CoarseTiming>) -> Vec<WordTiming> {
        let words = self.segmenter.words(text);
        if words.is_empty() {
            return Vec::new();
        }

        let total_ms = match coarse {
            Some(coarse) if coarse.end_ms > 0.0 => coarse.end_ms,
            _ => self.config.default_word_ms * words.len() as f64,
        };

        let weights: Vec<f64> = words.iter().map(|w| w.chars().count() as f64).collect();
        let durations = distribute(total_ms, &weights, self.config.min_word_ms);

        let mut cursor = 0.0;
        let timings: Vec<WordTiming> = words
            .iter()
            .zip(durations)
            .map(|(word, duration)| {
                let start = cursor;
                cursor += duration;
                WordTiming::estimated(*word, start, cursor)
            })
            .collect();

        tracing::debug!(
            words = timings.len(),
            total_ms,
            "Estimated word timings"
        );

        timings
    }
}

/// Split `total` proportionally to `weights` with every share at least `floor`
///
/// Shares that fall under the floor are pinned to it and the rest of the
/// total is redistributed among the remaining entries. When `total` cannot
/// cover `floor` for every entry, every entry gets the floor.
fn distribute(total: f64, weights: &[f64], floor: f64) -> Vec<f64> {
    let n = weights.len();
    if total <= floor * n as f64 {
        return vec![floor; n];
    }

    let mut pinned = vec![false; n];
    loop {
        let pinned_count = pinned.iter().filter(|p| **p).count();
        let remaining = total - floor * pinned_count as f64;
        let free_weight: f64 = weights
            .iter()
            .zip(&pinned)
            .filter(|(_, p)| !**p)
            .map(|(w, _)| *w)
            .sum();

        let shares: Vec<f64> = weights
            .iter()
            .zip(&pinned)
            .map(|(w, p)| {
                if *p {
                    floor
                } else if free_weight > 0.0 {
                    remaining * w / free_weight
                } else {
                    remaining / (n - pinned_count) as f64
                }
            })
            .collect();

        let mut newly_pinned = false;
        for (i, share) in shares.iter().enumerate() {
            if !pinned[i] && *share < floor {
                pinned[i] = true;
                newly_pinned = true;
            }
        }
        if !newly_pinned {
            return shares;
        }
    }
}
