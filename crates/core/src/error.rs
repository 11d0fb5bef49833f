//! Error types for the core data model

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core data model errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A single timing entry violates its own invariants
    #[error("Invalid timing at index {index}: {reason}")]
    InvalidTiming { index: usize, reason: String },

    /// Two consecutive entries are out of order or overlap
    #[error("Timing sequence broken between index {previous} and {index}: {reason}")]
    BrokenSequence {
        previous: usize,
        index: usize,
        reason: String,
    },
}
