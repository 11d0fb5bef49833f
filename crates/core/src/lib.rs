//! Core types for the karaoke TTS pipeline
//!
//! This crate provides the data model shared by every other crate:
//! - Word-level timing records and their provenance
//! - Text chunks and synthesis results
//! - Character classification for CJK text
//! - Error types

pub mod error;
pub mod speech;
pub mod text;
pub mod timing;

pub use error::{Error, Result};
pub use speech::{SynthesisResult, TextChunk};
pub use timing::{validate_sequence, CoarseTiming, TimingSource, WordTiming};
