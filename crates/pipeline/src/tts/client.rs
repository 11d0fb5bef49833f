//! MiniMax T2A v2 HTTP client

use std::time::Duration;

use karaoke_tts_config::{Credentials, SynthesisConfig, VoiceInfo};
use karaoke_tts_core::{CoarseTiming, SynthesisResult};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{SpeechSynthesizer, SynthesisError};

/// Voice id that resolves to `custom_voice_id`
const CUSTOM_VOICE_ALIAS: &str = "custom";

/// Longest response body kept in error messages
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct T2aRequest<'a> {
    model: &'a str,
    text: &'a str,
    stream: bool,
    voice_setting: VoiceSetting<'a>,
    audio_setting: AudioSetting<'a>,
}

#[derive(Debug, Serialize)]
struct VoiceSetting<'a> {
    voice_id: &'a str,
    speed: f32,
    vol: f32,
    pitch: i32,
}

#[derive(Debug, Serialize)]
struct AudioSetting<'a> {
    sample_rate: u32,
    bitrate: u32,
    format: &'a str,
    channel: u8,
}

#[derive(Debug, Default, Deserialize)]
struct T2aResponse {
    #[serde(default)]
    base_resp: Option<BaseResp>,
    #[serde(default)]
    data: Option<T2aData>,
    #[serde(default)]
    extra_info: Option<ExtraInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct BaseResp {
    #[serde(default)]
    status_code: i64,
    #[serde(default)]
    status_msg: String,
}

#[derive(Debug, Default, Deserialize)]
struct T2aData {
    #[serde(default)]
    audio: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtraInfo {
    /// Milliseconds
    #[serde(default)]
    audio_length: Option<f64>,
}

/// HTTP client for the synthesis provider
pub struct SpeechSynthesisClient {
    http: Client,
    config: SynthesisConfig,
    credentials: Option<Credentials>,
}

impl SpeechSynthesisClient {
    pub fn new(config: SynthesisConfig) -> Result<Self, SynthesisError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let credentials = match config.credentials() {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                tracing::warn!(error = %e, "Synthesis credentials not configured");
                None
            }
        };

        Ok(Self {
            http,
            config,
            credentials,
        })
    }

    pub fn supported_models(&self) -> &[String] {
        &self.config.supported_models
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Map the `custom` alias to the configured custom voice
    fn resolve_voice<'a>(&'a self, voice: &'a str) -> &'a str {
        match self.config.custom_voice_id.as_deref() {
            Some(custom) if !custom.is_empty() && voice == CUSTOM_VOICE_ALIAS => custom,
            _ => voice,
        }
    }

    fn is_known_voice(&self, voice: &str) -> bool {
        if self.config.has_voice(voice) {
            return true;
        }
        match self.config.custom_voice_id.as_deref() {
            Some(custom) if !custom.is_empty() => voice == CUSTOM_VOICE_ALIAS || voice == custom,
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for SpeechSynthesisClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        volume: f32,
    ) -> Result<SynthesisResult, SynthesisError> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            SynthesisError::Configuration("API key and group id are required".to_string())
        })?;
        if self.config.model.is_empty() {
            return Err(SynthesisError::Configuration("no model configured".to_string()));
        }
        if !self.is_known_voice(voice) {
            return Err(SynthesisError::UnsupportedVoice(voice.to_string()));
        }

        let voice_id = self.resolve_voice(voice);
        let request = T2aRequest {
            model: &self.config.model,
            text,
            stream: false,
            voice_setting: VoiceSetting {
                voice_id,
                speed,
                vol: volume,
                pitch: self.config.pitch,
            },
            audio_setting: AudioSetting {
                sample_rate: self.config.sample_rate,
                bitrate: self.config.bitrate,
                format: &self.config.format,
                channel: self.config.channel,
            },
        };

        tracing::debug!(
            chars = text.chars().count(),
            voice = voice_id,
            model = %self.config.model,
            "Calling synthesis API"
        );

        let response = self
            .http
            .post(&self.config.base_url)
            .query(&[("GroupId", credentials.group_id.as_str())])
            .bearer_auth(&credentials.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SynthesisError::RateLimited);
        }
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(SynthesisError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: T2aResponse = response.json().await?;

        let base = parsed.base_resp.unwrap_or_default();
        if base.status_code != 0 {
            return Err(SynthesisError::Api {
                status_code: base.status_code,
                status_msg: if base.status_msg.is_empty() {
                    "Unknown".to_string()
                } else {
                    base.status_msg
                },
            });
        }

        let audio_hex = parsed
            .data
            .and_then(|d| d.audio)
            .filter(|a| !a.is_empty())
            .ok_or(SynthesisError::EmptyAudio)?;
        let audio_bytes =
            hex::decode(audio_hex.trim()).map_err(|e| SynthesisError::MalformedAudio(e.to_string()))?;
        if audio_bytes.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }

        let audio_length_ms = parsed
            .extra_info
            .and_then(|e| e.audio_length)
            .filter(|ms| *ms > 0.0)
            .unwrap_or(0.0);

        tracing::debug!(
            bytes = audio_bytes.len(),
            audio_length_ms,
            "Synthesis API returned audio"
        );

        Ok(SynthesisResult::new(
            audio_bytes,
            CoarseTiming::spanning(audio_length_ms),
        ))
    }

    fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    fn default_voice(&self) -> &str {
        &self.config.default_voice
    }

    fn supported_voices(&self) -> Vec<VoiceInfo> {
        self.config.voices.clone()
    }

    fn validate_voice(&self, voice_id: &str) -> bool {
        self.is_known_voice(voice_id)
    }

    fn audio_format(&self) -> &str {
        &self.config.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> SynthesisConfig {
        SynthesisConfig {
            api_key: Some("key".to_string()),
            group_id: Some("group".to_string()),
            custom_voice_id: Some("my_cloned_voice".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_voice_catalogue() {
        let client = SpeechSynthesisClient::new(configured()).unwrap();
        assert!(client.is_configured());
        assert_eq!(client.supported_voices().len(), 7);
        assert!(client.validate_voice("Chinese (Mandarin)_Gentleman"));
        assert!(client.validate_voice("custom"));
        assert!(!client.validate_voice("nobody"));
        assert_eq!(client.resolve_voice("custom"), "my_cloned_voice");
        assert_eq!(client.resolve_voice(client.default_voice()), client.default_voice());
        assert_eq!(client.supported_models().len(), 4);
    }

    #[test]
    fn test_request_shape() {
        let request = T2aRequest {
            model: "speech-02-turbo",
            text: "你好",
            stream: false,
            voice_setting: VoiceSetting {
                voice_id: "v",
                speed: 1.0,
                vol: 0.8,
                pitch: 0,
            },
            audio_setting: AudioSetting {
                sample_rate: 32000,
                bitrate: 128000,
                format: "mp3",
                channel: 1,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["voice_setting"]["voice_id"], "v");
        assert_eq!(json["audio_setting"]["sample_rate"], 32000);
        assert_eq!(json["stream"], false);
    }
}
