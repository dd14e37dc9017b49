//! Audio job: generated text read out loud and posted as an audio attachment.

use log::info;

use super::{truncate_chars, JobContext, JobResult};
use crate::archive::write_response;
use crate::content::status_prefix;
use crate::elevenlabs::{ElevenLabsClient, VoiceSettings};
use crate::openai::ChatOptions;
use crate::publisher::{Attachments, ChainResult};

/// Media descriptions are kept below Mastodon's limit.
const DESCRIPTION_CHARS: usize = 1499;

#[derive(Debug, Clone)]
pub struct AudioJob {
    pub prompt: String,
    pub max_tokens: u32,
    /// Overrides the configured voice.
    pub voice_id: Option<String>,
}

impl Default for AudioJob {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            max_tokens: 100,
            voice_id: None,
        }
    }
}

impl AudioJob {
    pub async fn run(&self, context: &JobContext) -> JobResult<ChainResult> {
        info!("🤖 Starting Stochastic Parrot - Creating Audio 🔈");
        let openai = context.openai()?;
        let speech = ElevenLabsClient::new(&context.config.elevenlabs, context.policy())?;
        let mastodon = context.mastodon()?;
        let publisher = context.publisher()?;

        let completion = openai
            .chat(
                &self.prompt,
                &ChatOptions {
                    max_tokens: Some(self.max_tokens),
                    ..Default::default()
                },
            )
            .await?;
        write_response(&context.archive_dir("audio"), &completion.id, &completion).await?;
        let content = completion.content()?;

        info!("Generating Audio File...");
        let voice_id = self
            .voice_id
            .as_deref()
            .unwrap_or(&context.config.elevenlabs.voice_id);
        let settings = VoiceSettings::from(&context.config.elevenlabs);
        let file = speech
            .say(
                content,
                &context.tmp_file(&format!("{}.mp3", completion.id)),
                voice_id,
                &settings,
            )
            .await?;

        info!("🔼 Uploading Audio File to Mastodon...");
        let media_id = context
            .upload_media(&mastodon, &file, &truncate_chars(content, DESCRIPTION_CHARS), 0)
            .await?;
        context.wait_for_media_processing().await;

        info!("💬 Posting Audio File...");
        Ok(publisher
            .publish(status_prefix(&self.prompt), &Attachments::media(vec![media_id]))
            .await?)
    }
}
