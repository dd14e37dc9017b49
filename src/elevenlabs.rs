//! ElevenLabs text-to-speech client.

use std::path::{Path, PathBuf};

use log::{debug, info};
use reqwest::Client;
use serde::Serialize;

use crate::api::send_for_bytes;
use crate::config::{mask_token, require, ConfigError, ElevenLabsConfig};
use crate::content::sanitize_string;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

impl From<&ElevenLabsConfig> for VoiceSettings {
    fn from(config: &ElevenLabsConfig) -> Self {
        Self {
            stability: config.stability,
            similarity_boost: config.similarity_boost,
        }
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: String,
    voice_settings: &'a VoiceSettings,
}

pub struct ElevenLabsClient {
    client: Client,
    base_url: String,
    api_key: String,
    policy: RetryPolicy,
}

impl ElevenLabsClient {
    pub fn new(config: &ElevenLabsConfig, policy: RetryPolicy) -> Result<Self, ConfigError> {
        let api_key = require(&config.api_key, "TEXT_TO_AUDIO_API_KEY")?;
        debug!("ElevenLabs API key (masked): {}", mask_token(api_key));
        Ok(Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            policy,
        })
    }

    /// Converts `text` to speech and saves the MP3 stream to `path`.
    ///
    /// The text is stripped of markup and unpronounceable symbols first.
    ///
    /// # Returns
    ///
    /// The path the audio was written to.
    pub async fn say(
        &self,
        text: &str,
        path: &Path,
        voice_id: &str,
        settings: &VoiceSettings,
    ) -> Result<PathBuf, Box<dyn std::error::Error + Send + Sync>> {
        let url = format!("{}/text-to-speech/{}/stream", self.base_url, voice_id);
        let body = SpeechRequest {
            text: sanitize_string(text),
            voice_settings: settings,
        };
        info!(
            "Converting {} characters to speech with voice {}",
            body.text.chars().count(),
            voice_id
        );

        let audio = self
            .policy
            .call("text-to-speech", || {
                send_for_bytes(
                    self.client
                        .post(&url)
                        .header("xi-api-key", &self.api_key)
                        .header("Accept", "audio/mpeg")
                        .json(&body),
                    "text-to-speech",
                )
            })
            .await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &audio).await?;
        info!("Audio saved to {}", path.display());
        Ok(path.to_path_buf())
    }
}
