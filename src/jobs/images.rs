//! Images job: pictures generated from a prompt or from the local timeline.

use log::info;
use reqwest::Client;

use super::{truncate_chars, JobContext, JobResult};
use crate::archive::{download_file, write_response};
use crate::content::status_prefix;
use crate::error::ApiError;
use crate::mastodon::MastodonClient;
use crate::openai::ImageOptions;
use crate::publisher::{Attachments, ChainResult};

const DESCRIPTION_CHARS: usize = 1499;

#[derive(Debug, Clone)]
pub struct ImagesJob {
    /// Empty means the longest recent local status is used.
    pub prompt: String,
    /// How many local statuses are considered.
    pub timeline_limit: u32,
    /// Overrides the configured image count.
    pub count: Option<u32>,
    /// Overrides the configured image size.
    pub size: Option<String>,
}

impl Default for ImagesJob {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            timeline_limit: 5,
            count: None,
            size: None,
        }
    }
}

/// The longest of `statuses`, trimmed.
pub fn longest_status(statuses: &[String]) -> Option<&str> {
    statuses
        .iter()
        .map(|status| status.trim())
        .filter(|status| !status.is_empty())
        .fold(None, |longest: Option<&str>, status| match longest {
            Some(current) if current.chars().count() >= status.chars().count() => Some(current),
            _ => Some(status),
        })
}

impl ImagesJob {
    async fn image_prompt(&self, mastodon: &MastodonClient) -> JobResult<String> {
        let prompt = self.prompt.trim();
        if !prompt.is_empty() {
            return Ok(prompt.to_string());
        }
        let statuses = mastodon.local_timeline(self.timeline_limit).await?;
        let status = longest_status(&statuses)
            .ok_or_else(|| ApiError::data("timeline", "No statuses on the local timeline"))?;
        info!("🦻 {}", status);
        Ok(status.to_string())
    }

    pub async fn run(&self, context: &JobContext) -> JobResult<ChainResult> {
        info!("🤖 Starting Stochastic Parrot - Creating Images 🖼️");
        let openai = context.openai()?;
        let mastodon = context.mastodon()?;
        let publisher = context.publisher()?;
        let policy = context.policy();
        let client = Client::new();

        let prompt = self.image_prompt(&mastodon).await?;
        let options = ImageOptions {
            n: self.count.unwrap_or(context.config.openai.image_count),
            size: self
                .size
                .clone()
                .unwrap_or_else(|| context.config.openai.image_size.clone()),
        };
        let response = openai.images(&prompt, &options).await?;
        let dir = context.archive_dir("entries");
        write_response(&dir, &response.created.to_string(), &response).await?;

        let description = truncate_chars(&prompt, DESCRIPTION_CHARS);
        let mut media_ids = Vec::new();
        for (index, url) in response.urls()?.into_iter().enumerate() {
            let path = dir.join(format!("{}.{}.png", response.created, index + 1));
            download_file(&client, &policy, url, &path).await?;
            let media_id = context
                .upload_media(&mastodon, &path, &description, index)
                .await?;
            media_ids.push(media_id);
        }

        info!("💬 Posting {} image(s)...", media_ids.len());
        Ok(publisher
            .publish(status_prefix(&self.prompt), &Attachments::media(media_ids))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_status() {
        let statuses = vec![
            "short".to_string(),
            "  the longest one here  ".to_string(),
            "medium length".to_string(),
        ];
        assert_eq!(longest_status(&statuses), Some("the longest one here"));
        assert_eq!(longest_status(&[]), None);
        assert_eq!(longest_status(&["  ".to_string()]), None);
    }

    #[test]
    fn test_longest_status_keeps_the_first_on_ties() {
        let statuses = vec!["abc".to_string(), "xyz".to_string()];
        assert_eq!(longest_status(&statuses), Some("abc"));
    }
}
