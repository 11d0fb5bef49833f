//! Chinese text processing for the karaoke TTS pipeline
//!
//! This crate provides:
//! - **Segmentation**: lexical word segmentation (jieba) used for chunking and estimation
//! - **Script normalization**: Traditional to Simplified conversion with a three-tier
//!   fallback (exception phrases, conversion engine, character table) that never fails
//!
//! # Example
//!
//! ```ignore
//! use karaoke_tts_text_processing::{ScriptNormalizer, Segmenter};
//!
//! let normalizer = ScriptNormalizer::with_defaults();
//! assert_eq!(normalizer.convert_word("劇本"), "剧本");
//!
//! let words = Segmenter::new().words("我们今天去公园");
//! ```

pub mod script;
pub mod segment;

mod error;

pub use error::{Result, TextProcessingError};
pub use script::{
    CharTable, ConversionEngine, ConversionStats, ScriptNormalizer, SimplifiedValidation,
};
pub use segment::{Segmenter, Token};
