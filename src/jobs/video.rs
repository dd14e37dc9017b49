//! Video job: generated text rendered into a Creatomate template.

use log::info;

use super::{JobContext, JobResult};
use crate::archive::write_response;
use crate::content::{parse_json_content, status_prefix, VideoContent};
use crate::creatomate::{CreatomateClient, VideoTemplate};
use crate::openai::ChatOptions;
use crate::publisher::{Attachments, ChainResult};

#[derive(Debug, Clone)]
pub struct VideoJob {
    pub topic: String,
    pub max_tokens: u32,
    pub template: VideoTemplate,
}

impl Default for VideoJob {
    fn default() -> Self {
        Self {
            topic: String::new(),
            max_tokens: 350,
            template: VideoTemplate::default(),
        }
    }
}

impl VideoJob {
    pub async fn run(&self, context: &JobContext) -> JobResult<ChainResult> {
        info!("🤖 Starting Stochastic Parrot - Creating Video 📹");
        info!("Using template {}", self.template);
        let openai = context.openai()?;
        let renderer = CreatomateClient::new(&context.config.creatomate, context.policy())?;
        let mastodon = context.mastodon()?;
        let publisher = context.publisher()?;

        let completion = openai
            .chat(
                &self.template.prompt(&self.topic),
                &ChatOptions {
                    max_tokens: Some(self.max_tokens),
                    ..Default::default()
                },
            )
            .await?;
        write_response(&context.archive_dir("video"), &completion.id, &completion).await?;

        let content: VideoContent = parse_json_content(completion.content()?)?;
        let modifications = content.modifications();

        info!("📹 Generating Video");
        let render = renderer.render(self.template.id, &modifications).await?;
        let file = renderer
            .download(&render.url, &context.tmp_file(&format!("{}.mp4", completion.id)))
            .await?;

        info!("🔼 Uploading Video File to Mastodon...");
        let media_id = context
            .upload_media(&mastodon, &file, &content.description(), 0)
            .await?;
        context.wait_for_media_processing().await;

        info!("💬 Posting Video File...");
        let status = format!("{} {}", status_prefix(&self.topic), content.hashtags());
        Ok(publisher
            .publish(&status, &Attachments::media(vec![media_id]))
            .await?)
    }
}
