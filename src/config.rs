//! Configuration module for the Stochastic Parrot jobs.
//!
//! Credentials and tunables come from environment variables (optionally
//! loaded from a `.env` file by the binary) and can be overridden by command
//! line flags. Lookups go through a closure so tests never touch the process
//! environment.

use std::env;
use std::path::PathBuf;

use log::{debug, info, warn};

use crate::retry::{Backoff, RetryConfig};
use crate::segmenter::{SegmentLimits, Trailer};

/// Errors raised while assembling the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing {0} environment variable or command line flag")]
    MissingCredential(&'static str),
    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Mastodon instance and account credentials.
#[derive(Debug, Clone)]
pub struct MastodonConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    /// Retry settings for publishing statuses.
    pub publish_retry: RetryConfig,
    /// Wait after uploading audio or video so the instance can process it.
    pub media_processing_delay_ms: u64,
}

impl Default for MastodonConfig {
    fn default() -> Self {
        Self {
            base_url: "https://mastodon.social".to_string(),
            access_token: None,
            publish_retry: RetryConfig::new(3, 1000),
            media_processing_delay_ms: 10_000,
        }
    }
}

/// OpenAI chat and image generation settings.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub image_size: String,
    pub image_count: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            chat_model: "gpt-4".to_string(),
            image_size: "512x512".to_string(),
            image_count: 4,
        }
    }
}

/// ElevenLabs text-to-speech settings.
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub voice_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io/v1".to_string(),
            api_key: None,
            // Elli
            voice_id: "MF3mGyEYCl7XYWbV9V6O".to_string(),
            stability: 0.2,
            similarity_boost: 0.5,
        }
    }
}

/// Creatomate video rendering settings.
#[derive(Debug, Clone)]
pub struct CreatomateConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Wait between render status checks.
    pub render_poll_interval_ms: u64,
    /// Status checks before a render counts as stuck.
    pub render_max_polls: u32,
}

impl Default for CreatomateConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.creatomate.com/v1".to_string(),
            api_key: None,
            render_poll_interval_ms: 5000,
            render_max_polls: 120,
        }
    }
}

/// Everything a job needs to run.
#[derive(Debug, Clone)]
pub struct ParrotConfig {
    pub mastodon: MastodonConfig,
    pub openai: OpenAiConfig,
    pub elevenlabs: ElevenLabsConfig,
    pub creatomate: CreatomateConfig,
    /// Retry settings for generation, speech, download and upload calls.
    pub retry: RetryConfig,
    pub limits: SegmentLimits,
    /// Root for archived responses and generated media (`entries/`, `polls/`, ...).
    pub output_dir: PathBuf,
    /// Scratch space for files that are only needed until they are uploaded.
    pub tmp_dir: PathBuf,
    /// Skip publishing and retry waits.
    pub dry_run: bool,
}

impl Default for ParrotConfig {
    fn default() -> Self {
        Self {
            mastodon: MastodonConfig::default(),
            openai: OpenAiConfig::default(),
            elevenlabs: ElevenLabsConfig::default(),
            creatomate: CreatomateConfig::default(),
            retry: RetryConfig::default(),
            limits: SegmentLimits::default(),
            output_dir: PathBuf::from("site/public"),
            tmp_dir: PathBuf::from("tmp"),
            dry_run: false,
        }
    }
}

impl ParrotConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `MASTODON_ACCESS_TOKEN`, `MASTODON_URL`
    /// - `OPENAI_API_KEY`, `OPENAI_MODEL`
    /// - `TEXT_TO_AUDIO_API_KEY`
    /// - `CREATOMATIC_API_KEY`
    /// - `DEBUG_MODE` (`true` enables dry run)
    /// - `PARROT_OUTPUT_DIR`, `PARROT_TMP_DIR`
    /// - `PARROT_RETRY_COUNT`, `PARROT_RETRY_DELAY_MS`, `PARROT_RETRY_BACKOFF`
    /// - `PARROT_CHAT_HASHTAGS`, `PARROT_MEDIA_HASHTAGS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        info!("Loading configuration");
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = ParrotConfig::default();

        config.mastodon.access_token = secret(&get, "MASTODON_ACCESS_TOKEN");
        if let Some(url) = get("MASTODON_URL") {
            config.mastodon.base_url = url.trim_end_matches('/').to_string();
        }
        config.openai.api_key = secret(&get, "OPENAI_API_KEY");
        if let Some(model) = get("OPENAI_MODEL") {
            config.openai.chat_model = model;
        }
        config.elevenlabs.api_key = secret(&get, "TEXT_TO_AUDIO_API_KEY");
        config.creatomate.api_key = secret(&get, "CREATOMATIC_API_KEY");

        config.dry_run = get("DEBUG_MODE").map(|v| v == "true").unwrap_or(false);
        if config.dry_run {
            warn!("DEBUG_MODE is set, nothing will be published");
        }

        if let Some(dir) = get("PARROT_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("PARROT_TMP_DIR") {
            config.tmp_dir = PathBuf::from(dir);
        }

        if let Some(count) = get("PARROT_RETRY_COUNT") {
            config.retry.max_attempts = parse_number("PARROT_RETRY_COUNT", &count)?;
        }
        if let Some(delay) = get("PARROT_RETRY_DELAY_MS") {
            config.retry.delay_ms = parse_number("PARROT_RETRY_DELAY_MS", &delay)?;
        }
        if let Some(backoff) = get("PARROT_RETRY_BACKOFF") {
            config.retry.backoff = match backoff.to_lowercase().as_str() {
                "fixed" => Backoff::Fixed,
                "exponential" => Backoff::Exponential,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "PARROT_RETRY_BACKOFF",
                        value: backoff,
                    })
                }
            };
        }

        let mut trailer = Trailer::default();
        if let Some(tags) = get("PARROT_CHAT_HASHTAGS") {
            trailer.text = tags;
        }
        if let Some(tags) = get("PARROT_MEDIA_HASHTAGS") {
            trailer.media = tags;
        }
        config.limits.trailer = trailer;

        debug!(
            "Retry policy: {} attempts, {}ms delay, {:?}",
            config.retry.max_attempts, config.retry.delay_ms, config.retry.backoff
        );
        Ok(config)
    }
}

/// Returns the value of a required credential.
pub fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .ok_or(ConfigError::MissingCredential(name))
}

fn secret<F>(get: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(token) => {
            info!("Found {} with length: {}", key, token.len());
            debug!("{} (masked): {}", key, mask_token(&token));
            Some(token)
        }
        None => {
            debug!("No {} found", key);
            None
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

/// Shows at most the first and last few characters of a token.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    let prefix: String = chars.iter().take(8).collect();
    if chars.len() > 16 {
        let suffix: String = chars[chars.len() - 8..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        format!("{}...", prefix)
    }
}
