//! Poll job: a generated question posted with its answers as a poll.

use log::info;

use super::{JobContext, JobResult};
use crate::archive::write_response;
use crate::content::{parse_json_content, status_prefix, PollContent};
use crate::openai::ChatOptions;
use crate::publisher::{Attachments, ChainResult};

#[derive(Debug, Clone)]
pub struct PollJob {
    pub topic: String,
    pub max_tokens: u32,
    /// Seconds the poll stays open.
    pub expires_in: u64,
}

impl Default for PollJob {
    fn default() -> Self {
        Self {
            topic: String::new(),
            max_tokens: 250,
            expires_in: 60 * 60 * 24,
        }
    }
}

impl PollJob {
    pub fn prompt(&self) -> String {
        let topic = self.topic.trim();
        let subject = if topic.is_empty() {
            "a random poll question".to_string()
        } else {
            format!("a poll question about {}", topic)
        };
        format!(
            "Generate {} with 4 answers, give the result as a JSON object with the property 'question' as a string and 'answers' as an array of strings. Each answer should be max 50 characters.",
            subject
        )
    }

    pub async fn run(&self, context: &JobContext) -> JobResult<ChainResult> {
        info!("🤖 Starting Stochastic Parrot - Creating Poll 🗳️");
        let openai = context.openai()?;
        let publisher = context.publisher()?;

        let completion = openai
            .chat(
                &self.prompt(),
                &ChatOptions {
                    max_tokens: Some(self.max_tokens),
                    ..Default::default()
                },
            )
            .await?;
        write_response(&context.archive_dir("polls"), &completion.id, &completion).await?;

        let content: PollContent = parse_json_content(completion.content()?)?;
        let (question, poll) = content.into_poll(self.expires_in)?;
        info!("Poll with {} answers: {}", poll.options.len(), question);

        let status = format!("{} {}", status_prefix(&self.topic), question);
        Ok(publisher.publish(&status, &Attachments::poll(poll)).await?)
    }
}
