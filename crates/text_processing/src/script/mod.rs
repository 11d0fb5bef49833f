//! Traditional to Simplified script normalization
//!
//! Resolution order per unit:
//! 1. curated exception phrases for known ambiguous cases
//! 2. the general conversion engine, when one is compiled in and enabled
//! 3. the versioned per-character table, as a patch over whatever tier 2 left
//!
//! Unmapped characters pass through unchanged and conversion never fails.

mod engine;
mod table;

pub use engine::{default_engine, ConversionEngine};
#[cfg(feature = "zhconv")]
pub use engine::ZhconvEngine;
pub use table::{CharTable, TABLE_HEADER};

use karaoke_tts_core::WordTiming;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// Phrase-level overrides, applied longest first
const EXCEPTIONS: &[(&str, &str)] = &[
    ("什麽", "什么"),
    ("甚麽", "什么"),
    ("那麽", "那么"),
    ("要麽", "要么"),
    ("這麽", "这么"),
    ("怎麽", "怎么"),
    ("瞭解", "了解"),
    ("顯著", "显著"),
    ("乾淨", "干净"),
];

/// Glyphs that are legitimate in Simplified text too (著名, 乾隆, 於姓, 宫商角徵羽)
const SHARED_GLYPHS: &[char] = &['著', '乾', '瞭', '於', '徵', '藉', '夥', '閤', '麽'];

/// Result of scanning output for exclusively Traditional characters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimplifiedValidation {
    pub is_valid: bool,
    pub offending_chars: Vec<char>,
    pub offending_words: Vec<String>,
}

/// Counts of conversions made by each tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    pub exception_conversions: u64,
    pub engine_conversions: u64,
    pub table_conversions: u64,
    pub total_processed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    exception: AtomicU64,
    engine: AtomicU64,
    table: AtomicU64,
    total: AtomicU64,
}

/// Script normalizer shared by every job in the process
pub struct ScriptNormalizer {
    engine: Option<Box<dyn ConversionEngine>>,
    table: CharTable,
    exclusive: HashSet<char>,
    counters: Counters,
}

impl ScriptNormalizer {
    pub fn new(engine: Option<Box<dyn ConversionEngine>>, table: CharTable) -> Self {
        let exclusive = table
            .keys()
            .filter(|c| !SHARED_GLYPHS.contains(c))
            .collect();

        match &engine {
            Some(engine) => tracing::info!(
                engine = engine.name(),
                entries = table.len(),
                "Script normalizer ready"
            ),
            None => tracing::warn!(
                entries = table.len(),
                "No conversion engine, using exception phrases and character table only"
            ),
        }

        Self {
            engine,
            table,
            exclusive,
            counters: Counters::default(),
        }
    }

    /// Compiled-in engine plus the embedded table
    pub fn with_defaults() -> Self {
        Self::new(default_engine(), CharTable::embedded().clone())
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Convert a single word
    pub fn convert_word(&self, word: &str) -> String {
        if word.is_empty() {
            return String::new();
        }
        self.convert(word)
    }

    /// Convert the `word` of every entry, keeping the timing untouched
    pub fn convert_word_timings(&self, timings: Vec<WordTiming>) -> Vec<WordTiming> {
        let total = timings.len();
        let mut changed = 0usize;

        let converted: Vec<WordTiming> = timings
            .into_iter()
            .map(|timing| {
                let word = self.convert_word(&timing.word);
                if word != timing.word {
                    changed += 1;
                    timing.with_word(word)
                } else {
                    timing
                }
            })
            .collect();

        if changed > 0 {
            let stats = self.stats();
            tracing::info!(
                changed,
                total,
                exception = stats.exception_conversions,
                engine = stats.engine_conversions,
                table = stats.table_conversions,
                "Traditional to Simplified conversion"
            );
        }

        converted
    }

    /// Convert running text
    pub fn convert_text(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        self.convert(text)
    }

    fn convert(&self, input: &str) -> String {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        let mut text = input.to_string();

        if let Some(replaced) = apply_exceptions(&text) {
            self.counters.exception.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(from = %text, to = %replaced, "Exception phrase conversion");
            text = replaced;
        }

        if let Some(engine) = &self.engine {
            let converted = engine.convert(&text);
            if converted != text {
                self.counters.engine.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    from = %text,
                    to = %converted,
                    engine = engine.name(),
                    "Engine conversion"
                );
                text = converted;
            }
        }

        // Shared glyphs are only rewritten by exception phrases or the engine
        if let Some(patched) = self.patch_exclusive(&text) {
            self.counters.table.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(from = %text, to = %patched, "Character table conversion");
            text = patched;
        }

        text
    }

    fn patch_exclusive(&self, text: &str) -> Option<String> {
        if !text.chars().any(|c| self.exclusive.contains(&c)) {
            return None;
        }
        Some(
            text.chars()
                .map(|c| {
                    if self.exclusive.contains(&c) {
                        self.table.get(c).unwrap_or(c)
                    } else {
                        c
                    }
                })
                .collect(),
        )
    }

    /// Report exclusively Traditional characters that survived conversion
    pub fn validate_simplified(&self, timings: &[WordTiming]) -> SimplifiedValidation {
        let mut chars = BTreeSet::new();
        let mut words = Vec::new();

        for timing in timings {
            let mut hit = false;
            for c in timing.word.chars().filter(|c| self.exclusive.contains(c)) {
                chars.insert(c);
                hit = true;
            }
            if hit {
                words.push(timing.word.clone());
            }
        }

        let validation = SimplifiedValidation {
            is_valid: chars.is_empty(),
            offending_chars: chars.into_iter().collect(),
            offending_words: words,
        };

        if !validation.is_valid {
            tracing::warn!(
                chars = ?validation.offending_chars,
                words = ?validation.offending_words,
                "Traditional characters survived script normalization"
            );
        }

        validation
    }

    pub fn stats(&self) -> ConversionStats {
        ConversionStats {
            exception_conversions: self.counters.exception.load(Ordering::Relaxed),
            engine_conversions: self.counters.engine.load(Ordering::Relaxed),
            table_conversions: self.counters.table.load(Ordering::Relaxed),
            total_processed: self.counters.total.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.counters.exception.store(0, Ordering::Relaxed);
        self.counters.engine.store(0, Ordering::Relaxed);
        self.counters.table.store(0, Ordering::Relaxed);
        self.counters.total.store(0, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for ScriptNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptNormalizer")
            .field("engine", &self.engine.as_ref().map(|e| e.name()))
            .field("table_entries", &self.table.len())
            .finish()
    }
}

fn apply_exceptions(text: &str) -> Option<String> {
    let mut ordered: Vec<&(&str, &str)> = EXCEPTIONS.iter().collect();
    ordered.sort_by_key(|(from, _)| std::cmp::Reverse(from.chars().count()));

    let mut result: Option<String> = None;
    for (from, to) in ordered {
        let current = result.as_deref().unwrap_or(text);
        if current.contains(from) {
            result = Some(current.replace(from, to));
        }
    }
    result
}
