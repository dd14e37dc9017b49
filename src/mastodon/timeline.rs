//! Timeline reads for the Mastodon API.

use log::info;
use serde::Deserialize;

use super::MastodonClient;
use crate::api::send_for_json;
use crate::content::html_to_text;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
struct TimelineStatus {
    content: String,
}

impl MastodonClient {
    /// Returns the plain text of the latest statuses on the local timeline.
    pub async fn local_timeline(&self, limit: u32) -> Result<Vec<String>, ApiError> {
        info!("Reading {} status(es) from the local timeline", limit);
        let mut url = self.endpoint("/api/v1/timelines/public")?;
        url.query_pairs_mut()
            .append_pair("local", "true")
            .append_pair("limit", &limit.to_string());

        let statuses: Vec<TimelineStatus> = self
            .policy
            .call("timeline", || {
                send_for_json::<Vec<TimelineStatus>>(
                    self.client
                        .get(url.clone())
                        .header("Authorization", &self.auth_header),
                    "timeline",
                )
            })
            .await?;

        Ok(statuses
            .iter()
            .map(|status| html_to_text(&status.content))
            .filter(|text| !text.is_empty())
            .collect())
    }
}
