//! Pipeline section configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ConfigError;

/// Environment variable consulted when `synthesis.api_key` is unset
pub const API_KEY_ENV: &str = "MINIMAX_API_KEY";
/// Environment variable consulted when `synthesis.group_id` is unset
pub const GROUP_ID_ENV: &str = "MINIMAX_GROUP_ID";

/// A voice offered by the synthesis provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    #[serde(default = "default_voice_language")]
    pub language: String,
}

impl VoiceInfo {
    fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            language: default_voice_language(),
        }
    }
}

fn default_voice_language() -> String {
    "zh-CN".to_string()
}

/// Resolved provider credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub group_id: String,
}

/// Speech synthesis provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Endpoint, the group id is appended as a query parameter
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key (falls back to MINIMAX_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Group id (falls back to MINIMAX_GROUP_ID)
    #[serde(default)]
    pub group_id: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_supported_models")]
    pub supported_models: Vec<String>,

    #[serde(default = "default_voices")]
    pub voices: Vec<VoiceInfo>,

    #[serde(default = "default_voice")]
    pub default_voice: String,

    /// Target of the literal `custom` voice id
    #[serde(default)]
    pub custom_voice_id: Option<String>,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_bitrate")]
    pub bitrate: u32,

    /// Container format; chunks are joined per format, so only `mp3` and `wav`
    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default = "default_channel")]
    pub channel: u8,

    #[serde(default)]
    pub pitch: i32,

    #[serde(default = "default_speed")]
    pub default_speed: f32,

    #[serde(default = "default_volume")]
    pub default_volume: f32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.minimax.io/v1/t2a_v2".to_string()
}
fn default_model() -> String {
    "speech-02-turbo".to_string()
}
fn default_supported_models() -> Vec<String> {
    ["speech-02-turbo", "speech-02-hd", "speech-01-turbo", "speech-01-hd"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}
fn default_voices() -> Vec<VoiceInfo> {
    vec![
        VoiceInfo::new("moss_audio_96a80421-22ea-11f0-92db-0e8893cbb430", "Aria"),
        VoiceInfo::new("moss_audio_afeaf743-22e7-11f0-b934-42db1b8d9b3b", "Kevin"),
        VoiceInfo::new("moss_audio_2d7de658-22bd-11f0-92db-0e8893cbb430", "Nelson"),
        VoiceInfo::new("moss_audio_943faac0-1fbf-11f0-97b0-d62ca20b6c41", "Vera"),
        VoiceInfo::new("Chinese (Mandarin)_Lyrical_Voice", "Lyrical Voice"),
        VoiceInfo::new("Chinese (Mandarin)_Gentleman", "Gentleman"),
        VoiceInfo::new(
            "Chinese (Mandarin)_Reliable_Executive",
            "Reliable Executive",
        ),
    ]
}
fn default_voice() -> String {
    "moss_audio_96a80421-22ea-11f0-92db-0e8893cbb430".to_string()
}
fn default_sample_rate() -> u32 {
    32000
}
fn default_bitrate() -> u32 {
    128000
}
fn default_format() -> String {
    "mp3".to_string()
}
fn default_channel() -> u8 {
    1
}
fn default_speed() -> f32 {
    1.0
}
fn default_volume() -> f32 {
    0.8
}
fn default_request_timeout() -> u64 {
    60
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            group_id: None,
            model: default_model(),
            supported_models: default_supported_models(),
            voices: default_voices(),
            default_voice: default_voice(),
            custom_voice_id: None,
            sample_rate: default_sample_rate(),
            bitrate: default_bitrate(),
            format: default_format(),
            channel: default_channel(),
            pitch: 0,
            default_speed: default_speed(),
            default_volume: default_volume(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl SynthesisConfig {
    /// Resolve credentials from settings, then from the provider env vars
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let api_key = non_empty(self.api_key.clone())
            .or_else(|| non_empty(std::env::var(API_KEY_ENV).ok()))
            .ok_or_else(|| ConfigError::MissingField("synthesis.api_key".to_string()))?;
        let group_id = non_empty(self.group_id.clone())
            .or_else(|| non_empty(std::env::var(GROUP_ID_ENV).ok()))
            .ok_or_else(|| ConfigError::MissingField("synthesis.group_id".to_string()))?;
        Ok(Credentials { api_key, group_id })
    }

    pub fn has_voice(&self, voice_id: &str) -> bool {
        self.voices.iter().any(|v| v.id == voice_id)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum lexical words per synthesis call
    #[serde(default = "default_max_words")]
    pub max_words: usize,

    /// Break-point search window as a fraction of the target
    #[serde(default = "default_window_ratio")]
    pub window_ratio: f64,

    #[serde(default = "default_min_window_words")]
    pub min_window_words: usize,
}

fn default_max_words() -> usize {
    120
}
fn default_window_ratio() -> f64 {
    0.2
}
fn default_min_window_words() -> usize {
    5
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words: default_max_words(),
            window_ratio: default_window_ratio(),
            min_window_words: default_min_window_words(),
        }
    }
}

/// Synthesis API pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_rpm")]
    pub max_requests_per_minute: u32,

    /// Jobs with at most this many calls use the burst delay
    #[serde(default = "default_burst_max_calls")]
    pub burst_max_calls: usize,

    #[serde(default = "default_burst_delay_ms")]
    pub burst_delay_ms: u64,

    /// Sleep after an HTTP 429 before the single retry
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_max_rpm() -> u32 {
    58
}
fn default_burst_max_calls() -> usize {
    3
}
fn default_burst_delay_ms() -> u64 {
    100
}
fn default_cooldown_secs() -> u64 {
    20
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: default_max_rpm(),
            burst_max_calls: default_burst_max_calls(),
            burst_delay_ms: default_burst_delay_ms(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// Forced aligner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Aligner executable
    #[serde(default = "default_mfa_command")]
    pub command: String,

    #[serde(default = "default_mfa_model")]
    pub acoustic_model: String,

    #[serde(default = "default_mfa_model")]
    pub dictionary: String,

    #[serde(default = "default_ffmpeg_command")]
    pub ffmpeg_command: String,

    /// Sample rate of the mono WAV handed to the aligner
    #[serde(default = "default_alignment_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_alignment_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_model_list_timeout")]
    pub model_list_timeout_secs: u64,

    /// Fetch missing models once before giving up
    #[serde(default)]
    pub download_missing_models: bool,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Confidence attached to combined-audio alignments
    #[serde(default = "default_full_confidence")]
    pub full_confidence: f64,

    /// Confidence attached to per-chunk alignments
    #[serde(default = "default_chunk_confidence")]
    pub chunk_confidence: f64,

    /// Stretch output so the last word ends at the expected duration
    #[serde(default)]
    pub rescale_to_expected_duration: bool,

    /// Parent of per-run scratch directories (system temp when unset)
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}
fn default_mfa_command() -> String {
    "mfa".to_string()
}
fn default_mfa_model() -> String {
    "mandarin_mfa".to_string()
}
fn default_ffmpeg_command() -> String {
    "ffmpeg".to_string()
}
fn default_alignment_sample_rate() -> u32 {
    16000
}
fn default_alignment_timeout() -> u64 {
    120
}
fn default_probe_timeout() -> u64 {
    10
}
fn default_model_list_timeout() -> u64 {
    30
}
fn default_download_timeout() -> u64 {
    300
}
fn default_full_confidence() -> f64 {
    0.85
}
fn default_chunk_confidence() -> f64 {
    0.95
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_mfa_command(),
            acoustic_model: default_mfa_model(),
            dictionary: default_mfa_model(),
            ffmpeg_command: default_ffmpeg_command(),
            sample_rate: default_alignment_sample_rate(),
            timeout_secs: default_alignment_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            model_list_timeout_secs: default_model_list_timeout(),
            download_missing_models: false,
            download_timeout_secs: default_download_timeout(),
            full_confidence: default_full_confidence(),
            chunk_confidence: default_chunk_confidence(),
            rescale_to_expected_duration: false,
            scratch_dir: None,
        }
    }
}

/// Fallback timing estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationConfig {
    /// Per-word duration used when no coarse timing is known
    #[serde(default = "default_word_ms")]
    pub default_word_ms: f64,

    /// Floor for any single estimated word
    #[serde(default = "default_min_word_ms")]
    pub min_word_ms: f64,
}

fn default_word_ms() -> f64 {
    400.0
}
fn default_min_word_ms() -> f64 {
    100.0
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            default_word_ms: default_word_ms(),
            min_word_ms: default_min_word_ms(),
        }
    }
}

/// Traditional to Simplified normalization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Use the general conversion engine when compiled in
    #[serde(default = "default_true")]
    pub engine_enabled: bool,

    /// Replace the embedded character table
    #[serde(default)]
    pub table_path: Option<PathBuf>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            engine_enabled: true,
            table_path: None,
        }
    }
}

/// Audio probing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_ffprobe_command")]
    pub ffprobe_command: String,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Bitrate assumed when the container cannot be probed
    #[serde(default = "default_bitrate")]
    pub fallback_bitrate: u32,

    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: f64,
}

fn default_ffprobe_command() -> String {
    "ffprobe".to_string()
}
fn default_min_duration_ms() -> f64 {
    100.0
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffprobe_command: default_ffprobe_command(),
            probe_timeout_secs: default_probe_timeout(),
            fallback_bitrate: default_bitrate(),
            min_duration_ms: default_min_duration_ms(),
        }
    }
}

/// Progress session registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Delay before a finished session is removed
    #[serde(default = "default_cleanup_delay")]
    pub cleanup_delay_secs: u64,

    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Broadcast channel capacity for progress events
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_cleanup_delay() -> u64 {
    30
}
fn default_stale_after() -> u64 {
    600
}
fn default_sweep_interval() -> u64 {
    300
}
fn default_channel_capacity() -> usize {
    64
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            cleanup_delay_secs: default_cleanup_delay(),
            stale_after_secs: default_stale_after(),
            sweep_interval_secs: default_sweep_interval(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesis_defaults() {
        let config = SynthesisConfig::default();
        assert_eq!(config.voices.len(), 7);
        assert!(config.has_voice(&config.default_voice));
        assert_eq!(config.supported_models.len(), 4);
        assert!(config.supported_models.contains(&config.model));
        assert_eq!(config.sample_rate, 32000);
    }

    #[test]
    fn test_credentials_from_settings() {
        let config = SynthesisConfig {
            api_key: Some("key".to_string()),
            group_id: Some("group".to_string()),
            ..Default::default()
        };
        let creds = config.credentials().unwrap();
        assert_eq!(creds.api_key, "key");
        assert_eq!(creds.group_id, "group");
    }

    #[test]
    fn test_alignment_defaults() {
        let config = AlignmentConfig::default();
        assert_eq!(config.command, "mfa");
        assert_eq!(config.timeout_secs, 120);
        assert!(!config.rescale_to_expected_duration);
        assert!(config.chunk_confidence > config.full_confidence);
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let config: ChunkingConfig = serde_json::from_str(r#"{"max_words": 80}"#).unwrap();
        assert_eq!(config.max_words, 80);
        assert_eq!(config.min_window_words, 5);
    }
}
