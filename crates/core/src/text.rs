//! Character classification for CJK text
//!
//! Shared by the chunker (break priorities), the post-processor (punctuation
//! filtering) and the aligner transcript preparation.

/// Sentence-ending punctuation, highest break priority
pub const SENTENCE_ENDINGS: &[char] = &['。', '！', '？', '!', '?', '.'];

/// Clause-separating punctuation, second break priority
pub const CLAUSE_BREAKS: &[char] = &['，', '、', '；', ',', ';', '：', ':'];

/// Symbols that never form a displayable word on their own
pub const FILTERED_SYMBOLS: &[char] = &[
    // CJK punctuation
    '，', '。', '、', '？', '！', '：', '；', '（', '）', '\u{201C}', '\u{201D}', '\u{2018}',
    '\u{2019}',
    // Western punctuation
    ',', '.', '!', '?', ':', ';', '(', ')', '"', '\'',
    // Brackets
    '{', '}', '[', ']', '【', '】', '〈', '〉', '《', '》', '〔', '〕', '［', '］', '｛', '｝', '＜',
    '＞', '〖', '〗', '〘', '〙', '〚', '〛',
    // Symbols
    '—', '–', '…', '·', '@', '#', '$', '%', '^', '&', '*', '_', '=', '+', '|', '\\', '<', '>',
    '/', '~', '`',
];

/// Punctuation native to Chinese text, kept at its position in aligner transcripts
pub const NATIVE_PUNCTUATION: &[char] = &[
    '，', '。', '、', '？', '！', '：', '；', '（', '）', '"', '\'', '\u{201C}', '\u{201D}',
    '\u{2018}', '\u{2019}', '‚', '„', '‹', '›', '«', '»',
];

/// CJK unified ideographs, extension A and compatibility ideographs
pub fn is_ideograph(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}')
}

pub fn contains_ideograph(s: &str) -> bool {
    s.chars().any(is_ideograph)
}

pub fn is_sentence_ending(c: char) -> bool {
    SENTENCE_ENDINGS.contains(&c)
}

pub fn is_clause_break(c: char) -> bool {
    CLAUSE_BREAKS.contains(&c)
}

pub fn is_filtered_symbol(c: char) -> bool {
    FILTERED_SYMBOLS.contains(&c)
}

/// True when every character is whitespace or a filtered symbol
pub fn is_punctuation_only(s: &str) -> bool {
    s.chars().all(|c| c.is_whitespace() || is_filtered_symbol(c))
}
