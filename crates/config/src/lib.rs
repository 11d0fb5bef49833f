//! Configuration management for the karaoke TTS pipeline
//!
//! Supports loading configuration from:
//! - YAML/TOML files under `config/`
//! - Environment variables (KARAOKE_TTS__ prefix)

pub mod pipeline;
pub mod settings;

pub use pipeline::{
    AlignmentConfig, AudioConfig, ChunkingConfig, Credentials, EstimationConfig, ProgressConfig,
    RateLimitConfig, ScriptConfig, SynthesisConfig, VoiceInfo,
};
pub use settings::{load_settings, ObservabilityConfig, Settings};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
