//! Transcript preparation for the aligner

use karaoke_tts_core::text::{is_ideograph, NATIVE_PUNCTUATION};

/// Warn when more than this share of characters is stripped
const MAX_REMOVED_RATIO: f64 = 0.3;

/// Keep ideographs, whitespace and native punctuation in place
///
/// Decorative and non-native symbols are dropped and whitespace runs are
/// collapsed to a single space; the result is trimmed.
pub fn prepare_alignment_transcript(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if !(is_ideograph(c) || NATIVE_PUNCTUATION.contains(&c)) {
            continue;
        }
        if pending_space && !cleaned.is_empty() {
            cleaned.push(' ');
        }
        pending_space = false;
        cleaned.push(c);
    }

    let original = text.trim().chars().count();
    let kept = cleaned.chars().count();
    if cleaned.is_empty() {
        tracing::warn!(original_chars = original, "Alignment transcript is empty after cleaning");
    } else if (kept as f64) < original as f64 * (1.0 - MAX_REMOVED_RATIO) {
        tracing::warn!(
            original_chars = original,
            kept_chars = kept,
            "Alignment transcript lost a large share of characters"
        );
    }

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_native_punctuation() {
        assert_eq!(prepare_alignment_transcript("你好，世界。"), "你好，世界。");
        assert_eq!(
            prepare_alignment_transcript("“今天”天气（很好）！"),
            "“今天”天气（很好）！"
        );
    }

    #[test]
    fn test_strips_symbols_and_collapses_whitespace() {
        assert_eq!(prepare_alignment_transcript("  你好 ~~  世界 ★ "), "你好 世界");
        assert_eq!(prepare_alignment_transcript("【标题】内容"), "标题内容");
    }

    #[test]
    fn test_non_chinese_input_empties() {
        assert_eq!(prepare_alignment_transcript("hello 123"), "");
        assert_eq!(prepare_alignment_transcript(""), "");
    }
}
