//! Lexical word segmentation

use jieba_rs::Jieba;
use once_cell::sync::Lazy;

/// Dictionary load is expensive, do it once per process
static JIEBA: Lazy<Jieba> = Lazy::new(Jieba::new);

/// A segmenter token with its byte span in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl Token<'_> {
    pub fn is_whitespace(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Jieba-backed segmenter (HMM enabled)
#[derive(Debug, Clone, Copy, Default)]
pub struct Segmenter;

impl Segmenter {
    pub fn new() -> Self {
        Self
    }

    /// All tokens, whitespace included, with byte spans covering the input
    pub fn tokens<'a>(&self, text: &'a str) -> Vec<Token<'a>> {
        let mut cursor = 0;
        let mut tokens = Vec::new();

        for piece in JIEBA.cut(text, true) {
            if piece.is_empty() {
                continue;
            }
            let start = match text[cursor..].find(piece) {
                Some(offset) => cursor + offset,
                None => {
                    tracing::debug!(token = piece, "Segmenter token not found at cursor");
                    continue;
                }
            };
            let end = start + piece.len();
            tokens.push(Token {
                text: &text[start..end],
                start,
                end,
            });
            cursor = end;
        }

        tokens
    }

    /// Word tokens only (whitespace dropped, surrounding spaces trimmed)
    pub fn words<'a>(&self, text: &'a str) -> Vec<&'a str> {
        JIEBA
            .cut(text, true)
            .into_iter()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .collect()
    }

    pub fn word_count(&self, text: &str) -> usize {
        self.words(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_drop_whitespace() {
        let words = Segmenter::new().words("我们 今天\n去公园。");
        assert!(!words.is_empty());
        assert!(words.iter().all(|w| !w.trim().is_empty()));
        assert_eq!(words.concat(), "我们今天去公园。");
    }

    #[test]
    fn test_tokens_cover_input() {
        let text = "你好，世界！ 今天天气很好。";
        let tokens = Segmenter::new().tokens(text);
        let rebuilt: String = tokens.iter().map(|t| t.text).collect();
        assert_eq!(rebuilt, text);

        let mut expected_start = 0;
        for token in &tokens {
            assert_eq!(token.start, expected_start);
            assert_eq!(&text[token.start..token.end], token.text);
            expected_start = token.end;
        }
    }

    #[test]
    fn test_empty_text() {
        assert!(Segmenter::new().words("").is_empty());
        assert_eq!(Segmenter::new().word_count("   "), 0);
    }
}
