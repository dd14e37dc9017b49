//! Creatomate video rendering client and the video templates the parrot uses.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::api::{build_bearer_auth_header, send_for_json};
use crate::archive::download_file;
use crate::config::{mask_token, require, ConfigError, CreatomateConfig};
use crate::error::{ApiError, ErrorKind};
use crate::retry::RetryPolicy;

const TOPIC_PLACEHOLDER: &str = "[about] ";

/// A Creatomate template together with the prompt that fills it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTemplate {
    pub name: &'static str,
    pub id: &'static str,
    prompt: &'static str,
}

pub const HAPPY_VIDEO: VideoTemplate = VideoTemplate {
    name: "happy-video",
    id: "cb5ed739-810b-45a4-be18-7054e16500a9",
    prompt: "Always return a JSON object. The content result as property \"body\" which is an array of 4 strings no longer than 120 characters. Also always generate a \"hashtag\" property for the content with hashtags based on the content. Write content [about] that is mildly amusing or sarcastic. Don't mention that it's funny or sarcastic",
};

pub const MOTIVATIONAL_QUOTE: VideoTemplate = VideoTemplate {
    name: "motivational-quote",
    id: "f3ab36d7-9fef-415c-b966-c81bb587715a",
    prompt: "Always return a JSON object. The content result as property \"body\" which is an array of 1 string no longer than 120 characters. Also always generate a \"hashtag\" property for the content with hashtags based on the content. Generate a sarcastically funny motivational quote [about] that sounds like it's from a famous motivational speaker or guru. The quote should look original and inspiring, but isn't. Don't reveal it's supposed to be sarcastic or funny, but serious.",
};

pub const FIVE_FACTS: VideoTemplate = VideoTemplate {
    name: "five-facts",
    id: "3a77d06e-8940-40df-9d3b-3a507dd9265d",
    prompt: "Always return a JSON object. The content result as property \"body\" which is an array of 5 strings no longer than 120 characters. Also always generate a \"hashtag\" property for the content with hashtags based on the content. Include a property \"introText\" with an intro to the content. Content should be 5 funny non sequitur facts [about] but don't mention they are funny non sequitur facts",
};

pub const REAL_ESTATE: VideoTemplate = VideoTemplate {
    name: "real-estate",
    id: "a2f062e5-decb-423e-8ee8-85acb51728c8",
    prompt: "Always return a JSON object. The content result as property \"body\" which is an array of 3 strings no longer than 120 characters. Also always generate a \"hashtag\" property for the content with hashtags based on the content. Generate a single house listing [about] that must include a price and location. Content should be mildly amusing or sarcastic. Don't mention that it's funny or sarcastic",
};

pub const VIDEO_TEMPLATES: [VideoTemplate; 4] = [HAPPY_VIDEO, MOTIVATIONAL_QUOTE, FIVE_FACTS, REAL_ESTATE];

impl VideoTemplate {
    /// The generation prompt, mentioning `topic` when one is given.
    pub fn prompt(&self, topic: &str) -> String {
        let topic = topic.trim();
        if topic.is_empty() {
            self.prompt.replace(TOPIC_PLACEHOLDER, "")
        } else {
            self.prompt
                .replace(TOPIC_PLACEHOLDER, &format!("about {} ", topic))
        }
    }
}

impl Default for VideoTemplate {
    fn default() -> Self {
        FIVE_FACTS
    }
}

impl fmt::Display for VideoTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl FromStr for VideoTemplate {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let wanted: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        VIDEO_TEMPLATES
            .iter()
            .find(|template| template.name.replace('-', "") == wanted)
            .copied()
            .ok_or_else(|| {
                let names: Vec<&str> = VIDEO_TEMPLATES.iter().map(|t| t.name).collect();
                format!("unknown template '{}', expected one of: {}", name, names.join(", "))
            })
    }
}

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    template_id: &'a str,
    modifications: &'a BTreeMap<String, String>,
}

/// A render job as reported by Creatomate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Render {
    pub id: String,
    /// `planned`, `waiting`, `transcribing`, `rendering`, `succeeded` or `failed`.
    pub status: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Render {
    pub fn succeeded(&self) -> bool {
        self.status == "succeeded"
    }

    pub fn failed(&self) -> bool {
        self.status == "failed"
    }
}

pub struct CreatomateClient {
    client: Client,
    base_url: String,
    auth_header: String,
    policy: RetryPolicy,
    poll_interval: Duration,
    max_polls: u32,
}

impl CreatomateClient {
    pub fn new(config: &CreatomateConfig, policy: RetryPolicy) -> Result<Self, ConfigError> {
        let api_key = require(&config.api_key, "CREATOMATIC_API_KEY")?;
        debug!("Creatomate API key (masked): {}", mask_token(api_key));
        Ok(Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_header: build_bearer_auth_header(api_key),
            policy,
            poll_interval: Duration::from_millis(config.render_poll_interval_ms),
            max_polls: config.render_max_polls,
        })
    }

    /// Renders `template_id` and waits until the video is ready to download.
    ///
    /// # Returns
    ///
    /// The finished render. A render Creatomate reports as `failed` is a data
    /// error, one still unfinished after the configured number of status
    /// checks is a server error.
    pub async fn render(
        &self,
        template_id: &str,
        modifications: &BTreeMap<String, String>,
    ) -> Result<Render, ApiError> {
        let render = self.start_render(template_id, modifications).await?;
        self.wait_for_render(render).await
    }

    /// Starts a render of `template_id` and returns the first render of the batch.
    pub async fn start_render(
        &self,
        template_id: &str,
        modifications: &BTreeMap<String, String>,
    ) -> Result<Render, ApiError> {
        info!(
            "Rendering template {} with {} modification(s)",
            template_id,
            modifications.len()
        );
        let url = format!("{}/renders", self.base_url);
        let body = RenderRequest {
            template_id,
            modifications,
        };

        let renders: Vec<Render> = self
            .policy
            .call("renders", || {
                send_for_json::<Vec<Render>>(
                    self.client
                        .post(&url)
                        .header("Authorization", &self.auth_header)
                        .json(&body),
                    "renders",
                )
            })
            .await?;

        let render = renders
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::data("renders", "No render returned from Creatomate"))?;
        info!("Render {} is {} at {}", render.id, render.status, render.url);
        Ok(render)
    }

    /// Fetches the current state of a render.
    pub async fn render_status(&self, id: &str) -> Result<Render, ApiError> {
        let url = format!("{}/renders/{}", self.base_url, id);
        self.policy
            .call("renders", || {
                send_for_json::<Render>(
                    self.client
                        .get(&url)
                        .header("Authorization", &self.auth_header),
                    "renders",
                )
            })
            .await
    }

    /// Polls `render` until it succeeds, fails or runs out of status checks.
    pub async fn wait_for_render(&self, render: Render) -> Result<Render, ApiError> {
        let mut render = render;
        let mut polls = 0;
        loop {
            if render.succeeded() {
                info!("Render {} finished: {}", render.id, render.url);
                return Ok(render);
            }
            if render.failed() {
                let reason = render.error_message.as_deref().unwrap_or("no reason given");
                return Err(ApiError::data(
                    "renders",
                    format!("Render {} failed: {}", render.id, reason),
                ));
            }
            if polls >= self.max_polls {
                warn!("Render {} still {} after {} checks", render.id, render.status, polls);
                return Err(ApiError::new(ErrorKind::Server, "renders").with_message(format!(
                    "Render {} did not finish after {} checks",
                    render.id, polls
                )));
            }
            polls += 1;
            debug!(
                "Render {} is {}, checking again ({}/{})",
                render.id, render.status, polls, self.max_polls
            );
            if !self.poll_interval.is_zero() {
                tokio::time::sleep(self.poll_interval).await;
            }
            render = self.render_status(&render.id).await?;
        }
    }

    /// Downloads a finished render.
    pub async fn download(
        &self,
        url: &str,
        path: &Path,
    ) -> Result<PathBuf, Box<dyn std::error::Error + Send + Sync>> {
        download_file(&self.client, &self.policy, url, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_with_and_without_topic() {
        let with_topic = FIVE_FACTS.prompt("parrots");
        assert!(with_topic.contains("non sequitur facts about parrots but"));
        assert!(!with_topic.contains("[about]"));

        let without_topic = FIVE_FACTS.prompt(" ");
        assert!(without_topic.contains("non sequitur facts but"));
        assert!(!without_topic.contains("[about]"));
    }

    #[test]
    fn test_every_template_has_a_placeholder() {
        for template in VIDEO_TEMPLATES {
            assert!(template.prompt.contains(TOPIC_PLACEHOLDER), "{}", template);
        }
    }

    #[test]
    fn test_template_from_str() {
        assert_eq!("five-facts".parse::<VideoTemplate>().unwrap(), FIVE_FACTS);
        assert_eq!("fiveFacts".parse::<VideoTemplate>().unwrap(), FIVE_FACTS);
        assert_eq!("realEstate".parse::<VideoTemplate>().unwrap(), REAL_ESTATE);
        assert!("cat-videos".parse::<VideoTemplate>().is_err());
        assert_eq!(VideoTemplate::default(), FIVE_FACTS);
    }

    #[test]
    fn test_render_response() {
        let renders: Vec<Render> = serde_json::from_str(
            r#"[{"id": "r1", "status": "planned", "url": "https://cdn/r1.mp4", "template_id": "x"}]"#,
        )
        .unwrap();
        assert_eq!(renders[0].url, "https://cdn/r1.mp4");
        assert!(!renders[0].succeeded());

        let failed: Render = serde_json::from_str(
            r#"{"id": "r2", "status": "failed", "error_message": "Template not found"}"#,
        )
        .unwrap();
        assert!(failed.failed());
        assert_eq!(failed.url, "");
    }

    fn client(max_polls: u32) -> CreatomateClient {
        let config = CreatomateConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: Some("creatomate-key".to_string()),
            render_poll_interval_ms: 0,
            render_max_polls: max_polls,
        };
        CreatomateClient::new(&config, RetryPolicy::new(Default::default(), true)).unwrap()
    }

    fn render(status: &str) -> Render {
        Render {
            id: "r1".to_string(),
            status: status.to_string(),
            url: "https://cdn/r1.mp4".to_string(),
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_finished_render_is_returned_without_polling() {
        let finished = client(0).wait_for_render(render("succeeded")).await.unwrap();
        assert_eq!(finished.url, "https://cdn/r1.mp4");
    }

    #[tokio::test]
    async fn test_failed_render_is_a_data_error() {
        let mut failed = render("failed");
        failed.error_message = Some("Template not found".to_string());
        let err = client(3).wait_for_render(failed).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Data);
        assert!(err.to_string().contains("Template not found"));
    }

    #[tokio::test]
    async fn test_render_without_checks_left_gives_up() {
        let err = client(0).wait_for_render(render("rendering")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Server);
    }
}
