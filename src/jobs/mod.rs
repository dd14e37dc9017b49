//! The parrot's jobs.
//!
//! Every job generates content, archives the raw response, prepares any
//! media and finally publishes a reply chain to Mastodon. Steps run one
//! after another and the first failure ends the job.

pub mod audio;
pub mod chat;
pub mod images;
pub mod poll;
pub mod video;

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;

use crate::config::{ConfigError, ParrotConfig};
use crate::mastodon::MastodonClient;
use crate::openai::OpenAiClient;
use crate::publisher::ThreadedPublisher;
use crate::retry::RetryPolicy;

pub use audio::AudioJob;
pub use chat::ChatJob;
pub use images::ImagesJob;
pub use poll::PollJob;
pub use video::VideoJob;

pub type JobResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Configuration and client construction shared by all jobs.
pub struct JobContext {
    pub config: ParrotConfig,
}

impl JobContext {
    pub fn new(config: ParrotConfig) -> Self {
        Self { config }
    }

    pub fn dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Policy for generation, speech, rendering, download and upload calls.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.retry.clone(), self.config.dry_run)
    }

    pub fn openai(&self) -> Result<OpenAiClient, ConfigError> {
        OpenAiClient::new(&self.config.openai, self.policy())
    }

    pub fn mastodon(&self) -> Result<MastodonClient, ConfigError> {
        MastodonClient::new(&self.config.mastodon, self.policy())
    }

    /// A publisher over its own Mastodon client, retrying with the publish settings.
    pub fn publisher(&self) -> Result<ThreadedPublisher<MastodonClient>, ConfigError> {
        let policy = RetryPolicy::new(
            self.config.mastodon.publish_retry.clone(),
            self.config.dry_run,
        );
        Ok(ThreadedPublisher::new(
            self.mastodon()?,
            policy,
            self.config.limits.clone(),
            self.config.dry_run,
        ))
    }

    /// Directory under the output root where a job keeps its files.
    pub fn archive_dir(&self, kind: &str) -> PathBuf {
        self.config.output_dir.join(kind)
    }

    pub fn tmp_file(&self, name: &str) -> PathBuf {
        self.config.tmp_dir.join(name)
    }

    /// Uploads a media file, or pretends to in dry-run mode.
    pub async fn upload_media(
        &self,
        mastodon: &MastodonClient,
        path: &Path,
        description: &str,
        index: usize,
    ) -> JobResult<String> {
        if self.dry_run() {
            info!("Dry run, not uploading {}", path.display());
            return Ok(format!("dry-run-media-{}", index));
        }
        mastodon.upload_media(path, description).await
    }

    /// Gives the instance time to transcode audio and video before it is attached.
    pub async fn wait_for_media_processing(&self) {
        let delay_ms = self.config.mastodon.media_processing_delay_ms;
        if self.dry_run() || delay_ms == 0 {
            return;
        }
        info!("Waiting {}ms for media processing", delay_ms);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}

/// Takes at most `max` characters of `text`.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_dir_and_tmp_file() {
        let mut config = ParrotConfig::default();
        config.output_dir = PathBuf::from("/srv/site");
        config.tmp_dir = PathBuf::from("/tmp/parrot");
        let context = JobContext::new(config);

        assert_eq!(context.archive_dir("polls"), PathBuf::from("/srv/site/polls"));
        assert_eq!(context.tmp_file("a.mp3"), PathBuf::from("/tmp/parrot/a.mp3"));
    }

    #[test]
    fn test_clients_need_credentials() {
        let context = JobContext::new(ParrotConfig::default());
        assert!(matches!(
            context.openai(),
            Err(ConfigError::MissingCredential("OPENAI_API_KEY"))
        ));
        assert!(matches!(
            context.publisher(),
            Err(ConfigError::MissingCredential("MASTODON_ACCESS_TOKEN"))
        ));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("🦜🦜🦜", 2), "🦜🦜");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }
}
