//! Praat TextGrid (long text format) parsing

use once_cell::sync::Lazy;
use regex::Regex;

static ITEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"item \[\d+\]:").unwrap());

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"name = "([^"]*)""#).unwrap());

static INTERVAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"intervals \[(\d+)\]:\s*xmin = ([\d.]+)\s*xmax = ([\d.]+)\s*text = "([^"]*)""#)
        .unwrap()
});

/// Labels the aligner uses for non-speech
const SILENCE_LABELS: &[&str] = &["<SIL>", "sil", "sp", "spn", "<eps>"];

/// Tier holding word-level intervals
const WORD_TIER: &str = "words";

/// One labelled interval, in milliseconds
#[derive(Debug, Clone, PartialEq)]
pub struct TextGridInterval {
    pub text: String,
    pub start_ms: f64,
    pub end_ms: f64,
}

fn is_silence(label: &str) -> bool {
    label.is_empty() || SILENCE_LABELS.contains(&label)
}

fn parse_intervals(section: &str) -> Vec<TextGridInterval> {
    INTERVAL_RE
        .captures_iter(section)
        .filter_map(|caps| {
            let label = caps[4].trim();
            if is_silence(label) {
                return None;
            }
            let xmin: f64 = caps[2].parse().ok()?;
            let xmax: f64 = caps[3].parse().ok()?;
            Some(TextGridInterval {
                text: label.to_string(),
                start_ms: xmin * 1000.0,
                end_ms: xmax * 1000.0,
            })
        })
        .collect()
}

/// Speech intervals from the `words` tier, or the first tier when none is named so
pub fn parse_textgrid(content: &str) -> Vec<TextGridInterval> {
    let starts: Vec<usize> = ITEM_RE.find_iter(content).map(|m| m.start()).collect();
    if starts.is_empty() {
        return parse_intervals(content);
    }

    let sections: Vec<&str> = starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(content.len());
            &content[start..end]
        })
        .collect();

    let words_tier = sections.iter().find(|section| {
        NAME_RE
            .captures(section)
            .map(|caps| &caps[1] == WORD_TIER)
            .unwrap_or(false)
    });

    match words_tier.or_else(|| sections.first()) {
        Some(section) => parse_intervals(section),
        None => Vec::new(),
    }
}
