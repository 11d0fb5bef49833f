//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{
    AlignmentConfig, AudioConfig, ChunkingConfig, ConfigError, EstimationConfig, ProgressConfig,
    RateLimitConfig, ScriptConfig, SynthesisConfig,
};

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Speech synthesis provider
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Forced aligner
    #[serde(default)]
    pub alignment: AlignmentConfig,

    #[serde(default)]
    pub estimation: EstimationConfig,

    /// Script normalization
    #[serde(default)]
    pub script: ScriptConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.max_words == 0 {
            return Err(invalid("chunking.max_words", "must be at least 1"));
        }
        if !(self.chunking.window_ratio > 0.0 && self.chunking.window_ratio <= 1.0) {
            return Err(invalid("chunking.window_ratio", "must be in (0, 1]"));
        }
        if self.rate_limit.max_requests_per_minute == 0 {
            return Err(invalid(
                "rate_limit.max_requests_per_minute",
                "must be at least 1",
            ));
        }

        for (field, value) in [
            ("alignment.full_confidence", self.alignment.full_confidence),
            ("alignment.chunk_confidence", self.alignment.chunk_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, "must be in [0, 1]"));
            }
        }

        if self.estimation.min_word_ms <= 0.0 {
            return Err(invalid("estimation.min_word_ms", "must be positive"));
        }

        if !self.synthesis.has_voice(&self.synthesis.default_voice) {
            return Err(invalid(
                "synthesis.default_voice",
                &format!("'{}' is not a configured voice", self.synthesis.default_voice),
            ));
        }

        if !SUPPORTED_AUDIO_FORMATS.contains(&self.synthesis.format.as_str()) {
            return Err(invalid(
                "synthesis.format",
                &format!(
                    "'{}' cannot be combined across chunks; use one of {:?}",
                    self.synthesis.format, SUPPORTED_AUDIO_FORMATS
                ),
            ));
        }

        if !self.synthesis.supported_models.contains(&self.synthesis.model) {
            tracing::warn!(
                model = %self.synthesis.model,
                "Synthesis model is not in the supported model list"
            );
        }

        Ok(())
    }
}

/// Formats whose chunks can be joined into one playable file
const SUPPORTED_AUDIO_FORMATS: &[&str] = &["mp3", "wav"];

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (KARAOKE_TTS__ prefix, `__` separated)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder
            .add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("KARAOKE_TTS")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.chunking.max_words, 120);
        assert_eq!(settings.rate_limit.max_requests_per_minute, 58);
        assert_eq!(settings.progress.cleanup_delay_secs, 30);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.chunking.max_words = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.alignment.full_confidence = 1.5;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "alignment.full_confidence"
        ));

        let mut settings = Settings::default();
        settings.synthesis.default_voice = "nobody".to_string();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.chunking.window_ratio = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.synthesis.format = "flac".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "synthesis.format"
        ));
        settings.synthesis.format = "wav".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_layered_source() {
        let config = Config::builder()
            .add_source(File::from_str(
                "chunking:\n  max_words: 40\nalignment:\n  enabled: false\n",
                FileFormat::Yaml,
            ))
            .build()
            .unwrap();
        let settings: Settings = config.try_deserialize().unwrap();
        assert_eq!(settings.chunking.max_words, 40);
        assert!(!settings.alignment.enabled);
        assert_eq!(settings.alignment.timeout_secs, 120);
        assert_eq!(settings.estimation.min_word_ms, 100.0);
    }
}
