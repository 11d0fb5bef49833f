//! Word-bounded chunking for synthesis
//!
//! Splits long text into chunks the synthesis API accepts, breaking at
//! natural punctuation where possible. Chunks are byte slices of the input,
//! so joining them reproduces the input exactly.

use karaoke_tts_config::ChunkingConfig;
use karaoke_tts_core::text::{is_clause_break, is_sentence_ending};
use karaoke_tts_core::TextChunk;
use karaoke_tts_text_processing::Segmenter;

/// Break-point preference, higher wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BreakPriority {
    Arbitrary,
    Clause,
    Sentence,
}

impl BreakPriority {
    fn of(word: &str) -> Self {
        if word.chars().any(is_sentence_ending) {
            BreakPriority::Sentence
        } else if word.chars().any(is_clause_break) {
            BreakPriority::Clause
        } else {
            BreakPriority::Arbitrary
        }
    }
}

/// Chunker configuration
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Default maximum words per chunk
    pub max_words: usize,
    /// Search window as a fraction of the target
    pub window_ratio: f64,
    /// Minimum search window in words
    pub min_window_words: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_words: 120,
            window_ratio: 0.2,
            min_window_words: 5,
        }
    }
}

impl From<&ChunkingConfig> for ChunkerConfig {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            max_words: config.max_words,
            window_ratio: config.window_ratio,
            min_window_words: config.min_window_words,
        }
    }
}

struct Word<'a> {
    text: &'a str,
    start: usize,
}

/// Splits text into synthesis-sized chunks
#[derive(Debug, Clone, Default)]
pub struct TextChunker {
    config: ChunkerConfig,
    segmenter: Segmenter,
}

impl TextChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config,
            segmenter: Segmenter::new(),
        }
    }

    /// Maximum words per chunk used by `split_default`
    pub fn max_words(&self) -> usize {
        self.config.max_words
    }

    /// Number of lexical words in `text`
    pub fn word_count(&self, text: &str) -> usize {
        self.segmenter.word_count(text)
    }

    pub fn split_default(&self, text: &str) -> Vec<TextChunk> {
        self.split(text, self.config.max_words)
    }

    /// Split `text` into chunks of at most roughly `max_words` words
    pub fn split(&self, text: &str, max_words: usize) -> Vec<TextChunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let max_words = max_words.max(1);
        let words: Vec<Word<'_>> = self
            .segmenter
            .tokens(text)
            .into_iter()
            .filter(|t| !t.is_whitespace())
            .map(|t| Word {
                text: t.text,
                start: t.start,
            })
            .collect();

        if words.len() <= max_words {
            return vec![TextChunk::new(text, words.len())];
        }

        let mut chunks = Vec::new();
        let mut chunk_start_byte = 0;
        let mut current = 0;

        while current < words.len() {
            let remaining = words.len() - current;
            if remaining <= max_words {
                chunks.push(TextChunk::new(&text[chunk_start_byte..], remaining));
                break;
            }

            let taken = self.find_break(&words[current..], max_words);
            let next = current + taken;
            let boundary = words[next].start;

            chunks.push(TextChunk::new(&text[chunk_start_byte..boundary], taken));
            chunk_start_byte = boundary;
            current = next;
        }

        tracing::debug!(
            chunks = chunks.len(),
            words = words.len(),
            max_words,
            "Split text into chunks"
        );

        chunks
    }

    /// Number of words to take from `words`; always in `1..words.len()`
    fn find_break(&self, words: &[Word<'_>], target: usize) -> usize {
        let window = ((target as f64 * self.config.window_ratio).floor() as usize)
            .max(self.config.min_window_words);
        let lo = target.saturating_sub(window).max(1);
        let hi = (target + window).min(words.len() - 1);

        let mut best = target.min(hi).max(lo);
        let mut best_priority = BreakPriority::of(words[best - 1].text);

        for pos in lo..=hi {
            let priority = BreakPriority::of(words[pos - 1].text);
            let closer = pos.abs_diff(target) < best.abs_diff(target);
            if priority > best_priority || (priority == best_priority && closer) {
                best = pos;
                best_priority = priority;
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(chunks: &[TextChunk]) -> String {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = TextChunker::default();
        let chunks = chunker.split("你好，世界。", 120);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "你好，世界。");
    }

    #[test]
    fn test_130_words_two_chunks() {
        let chunker = TextChunker::default();
        let text = "我们。".repeat(65);
        assert_eq!(chunker.word_count(&text), 130);

        let chunks = chunker.split(&text, 120);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
        assert_eq!(joined(&chunks), text);
        assert_eq!(chunks[0].word_count + chunks[1].word_count, 130);
        // Ends on sentence punctuation closest to the target
        assert_eq!(chunks[0].word_count, 120);
        assert!(chunks[0].text.ends_with('。'));
    }

    #[test]
    fn test_prefers_sentence_over_clause() {
        let chunker = TextChunker::default();
        // 20 words: clause break right at the target, sentence end three words later
        let mut text = String::new();
        for i in 0..20 {
            text.push_str("今天");
            text.push(match i {
                9 => '，',
                12 => '。',
                _ => ' ',
            });
        }
        let chunks = chunker.split(&text, 10);
        assert_eq!(joined(&chunks), text);
        assert!(chunks[0].text.trim_end().ends_with('。'));
    }

    #[test]
    fn test_arbitrary_break_closest_to_target() {
        let chunker = TextChunker::default();
        let text = "今天 ".repeat(30);
        let chunks = chunker.split(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.word_count == 10));
        assert_eq!(joined(&chunks), text);
    }

    #[test]
    fn test_lossless_for_many_sizes() {
        let chunker = TextChunker::default();
        let texts = [
            "  开头有空格。我们今天去公园，然后回家吃饭！你觉得怎么样？  ",
            "第一句话。第二句话，还有第三句话；最后一句话!",
            "abc 中文 mixed 文本, with punctuation. 好的",
        ];
        for text in texts {
            for n in 1..8 {
                let chunks = chunker.split(text, n);
                assert_eq!(joined(&chunks), text, "n = {}", n);
                assert!(chunks.iter().all(|c| !c.text.is_empty()));
            }
        }
    }

    #[test]
    fn test_empty_text() {
        assert!(TextChunker::default().split("", 10).is_empty());
    }
}
