//! Speech synthesis
//!
//! Features:
//! - Word-bounded chunking with natural break points
//! - Provider rate limiting with a single 429 cooldown retry
//! - HTTP client for the MiniMax T2A v2 API

mod chunker;
mod client;
mod rate_limit;

pub use chunker::{ChunkerConfig, TextChunker};
pub use client::SpeechSynthesisClient;
pub use rate_limit::RateLimiter;

use karaoke_tts_config::VoiceInfo;
use karaoke_tts_core::SynthesisResult;
use thiserror::Error;

/// Synthesis errors
#[derive(Error, Debug)]
pub enum SynthesisError {
    /// Missing credentials, voice or model
    #[error("Synthesis not configured: {0}")]
    Configuration(String),

    #[error("Unsupported voice: {0}")]
    UnsupportedVoice(String),

    /// HTTP 429 from the provider
    #[error("Rate limited by synthesis provider")]
    RateLimited,

    #[error("Synthesis request failed with HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Non-zero `base_resp.status_code`
    #[error("Synthesis API error {status_code}: {status_msg}")]
    Api { status_code: i64, status_msg: String },

    #[error("No audio data in synthesis response")]
    EmptyAudio,

    #[error("Malformed audio payload: {0}")]
    MalformedAudio(String),

    #[error("Synthesis transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl SynthesisError {
    /// The only transient case; everything else is fatal for the job
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SynthesisError::RateLimited)
    }
}

/// Speech synthesis backend
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one chunk of text; a single provider call, never retried here
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        volume: f32,
    ) -> Result<SynthesisResult, SynthesisError>;

    /// Whether credentials are present
    fn is_configured(&self) -> bool;

    /// Voice used when the caller does not pick one
    fn default_voice(&self) -> &str;

    fn supported_voices(&self) -> Vec<VoiceInfo>;

    fn validate_voice(&self, voice_id: &str) -> bool {
        self.supported_voices().iter().any(|v| v.id == voice_id)
    }

    /// Encoded container format of returned audio (file extension)
    fn audio_format(&self) -> &str {
        "mp3"
    }
}
