//! Error types for text processing

use thiserror::Error;

/// Text processing errors
///
/// Conversion itself never fails; these cover loading the character table.
#[derive(Debug, Error)]
pub enum TextProcessingError {
    /// Malformed character table line
    #[error("Character table parse error at line {line}: {message}")]
    TableParse { line: usize, message: String },

    /// Unsupported or missing table header
    #[error("Unsupported character table version: {0}")]
    TableVersion(String),

    /// A character is both a conversion source and a conversion target
    #[error("Character table maps '{0}' but also produces it")]
    TableNotClosed(char),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for text processing
pub type Result<T> = std::result::Result<T, TextProcessingError>;
