//! Mastodon API integration module.
//!
//! This module contains the client used to publish statuses, upload media
//! attachments and read the local timeline of a Mastodon instance.

mod media;
mod statuses;
mod timeline;

use log::{debug, info};
use reqwest::Client;
use url::Url;

use crate::api::build_bearer_auth_header;
use crate::config::{mask_token, require, ConfigError, MastodonConfig};
use crate::error::ApiError;
use crate::retry::RetryPolicy;

pub use media::media_mime_type;
pub use statuses::status_form;

/// Authenticated client for one Mastodon account.
pub struct MastodonClient {
    client: Client,
    base_url: Url,
    auth_header: String,
    /// Used for media uploads and timeline reads. Publishing is retried by the
    /// threaded publisher instead.
    policy: RetryPolicy,
}

impl MastodonClient {
    pub fn new(config: &MastodonConfig, policy: RetryPolicy) -> Result<Self, ConfigError> {
        let access_token = require(&config.access_token, "MASTODON_ACCESS_TOKEN")?;
        let base_url = Url::parse(&config.base_url).map_err(|_| ConfigError::InvalidValue {
            key: "MASTODON_URL",
            value: config.base_url.clone(),
        })?;

        info!("Creating Mastodon client for {}", base_url);
        debug!("Mastodon access token (masked): {}", mask_token(access_token));

        Ok(Self {
            client: Client::new(),
            base_url,
            auth_header: build_bearer_auth_header(access_token),
            policy,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::data(path, format!("Invalid endpoint: {}", e)))
    }
}
