//! Chat job: a generated text posted as a thread.

use log::info;

use super::images::longest_status;
use super::{JobContext, JobResult};
use crate::archive::write_response;
use crate::content::status_prefix;
use crate::error::ApiError;
use crate::openai::ChatOptions;
use crate::publisher::{Attachments, ChainResult};

#[derive(Debug, Clone)]
pub struct ChatJob {
    /// Empty lets the model pick the subject.
    pub prompt: String,
    pub max_tokens: u32,
    /// Answer the longest recent local status instead of `prompt`.
    pub from_local: bool,
    /// How many local statuses are considered with `from_local`.
    pub timeline_limit: u32,
}

impl Default for ChatJob {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            max_tokens: 350,
            from_local: false,
            timeline_limit: 5,
        }
    }
}

/// Asks for a reply to `toot`.
pub fn reply_prompt(toot: &str) -> String {
    format!(
        "For the following toot: {} - think of a response that would be suitable",
        toot
    )
}

impl ChatJob {
    async fn chat_prompt(&self, context: &JobContext) -> JobResult<String> {
        if !self.from_local {
            return Ok(self.prompt.clone());
        }
        let statuses = context.mastodon()?.local_timeline(self.timeline_limit).await?;
        let toot = longest_status(&statuses)
            .ok_or_else(|| ApiError::data("timeline", "No statuses on the local timeline"))?;
        info!("🦻 {}", toot);
        Ok(reply_prompt(toot))
    }

    pub async fn run(&self, context: &JobContext) -> JobResult<ChainResult> {
        info!("🤖 Starting Stochastic Parrot - Creating Chat 🦜");
        let openai = context.openai()?;
        let publisher = context.publisher()?;

        let prompt = self.chat_prompt(context).await?;
        let completion = openai
            .chat(
                &prompt,
                &ChatOptions {
                    max_tokens: Some(self.max_tokens),
                    ..Default::default()
                },
            )
            .await?;
        info!("💾 Saving Response");
        write_response(&context.archive_dir("entries"), &completion.id, &completion).await?;

        let toot = format!("{} {}", status_prefix(&prompt), completion.content()?);
        info!("Creating Toot: {}", toot);
        Ok(publisher.publish(&toot, &Attachments::default()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_prompt() {
        assert_eq!(
            reply_prompt("Parrots can live for 80 years"),
            "For the following toot: Parrots can live for 80 years - think of a response that would be suitable"
        );
    }
}
