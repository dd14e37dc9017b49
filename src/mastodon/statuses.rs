//! Status operations for the Mastodon API.

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;

use super::MastodonClient;
use crate::api::{sanitize_for_logging, send_for_json};
use crate::error::ApiError;
use crate::publisher::{Post, PublishRequest, PublishTransport};

#[derive(Debug, Deserialize)]
struct StatusResponse {
    id: String,
    url: Option<String>,
    uri: String,
}

/// Form fields for `POST /api/v1/statuses`.
pub fn status_form(request: &PublishRequest) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("status", request.text.clone()),
        ("visibility", request.visibility.as_str().to_string()),
    ];
    if let Some(reply_to_id) = &request.reply_to_id {
        form.push(("in_reply_to_id", reply_to_id.clone()));
    }
    for media_id in &request.media_ids {
        form.push(("media_ids[]", media_id.clone()));
    }
    if let Some(poll) = &request.poll {
        for option in &poll.options {
            form.push(("poll[options][]", option.clone()));
        }
        form.push(("poll[expires_in]", poll.expires_in.to_string()));
    }
    form
}

impl MastodonClient {
    /// Posts a single status and returns its id and public URL.
    pub async fn post_status(&self, request: &PublishRequest) -> Result<Post, ApiError> {
        info!(
            "Posting status ({} characters{})",
            request.text.chars().count(),
            match &request.reply_to_id {
                Some(id) => format!(", in reply to {}", id),
                None => String::new(),
            }
        );
        debug!("Status text: '{}'", sanitize_for_logging(&request.text, 120));

        let url = self.endpoint("/api/v1/statuses")?;
        let request_builder = self
            .client
            .post(url)
            .header("Authorization", &self.auth_header)
            .form(&status_form(request));

        let status: StatusResponse = send_for_json(request_builder, "statuses").await?;
        Ok(Post {
            id: status.id,
            url: status.url.unwrap_or(status.uri),
        })
    }
}

#[async_trait]
impl PublishTransport for MastodonClient {
    async fn publish(&self, request: &PublishRequest) -> Result<Post, ApiError> {
        self.post_status(request).await
    }
}
