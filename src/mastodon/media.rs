//! Media attachment uploads for the Mastodon API.

use std::path::Path;

use log::{debug, info};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::MastodonClient;
use crate::api::send_for_json;
use crate::error::ApiError;

/// Mastodon rejects longer media descriptions.
const MAX_DESCRIPTION_CHARS: usize = 1500;

#[derive(Debug, Deserialize)]
struct MediaAttachment {
    id: String,
}

/// Guesses the MIME type of an attachment from its file extension.
pub fn media_mime_type(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}

impl MastodonClient {
    /// Uploads a local file as a media attachment and returns its id.
    pub async fn upload_media(
        &self,
        path: &Path,
        description: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        info!("Uploading media {}", path.display());
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let mime = media_mime_type(path);
        let description: String = description.chars().take(MAX_DESCRIPTION_CHARS).collect();
        let url = self.endpoint("/api/v2/media")?;
        debug!("Media payload: {} bytes of {}", bytes.len(), mime);

        let media: MediaAttachment = self
            .policy
            .call("media", || {
                let part = Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(&mime);
                let request_builder = part.map(|part| {
                    let form = Form::new()
                        .text("description", description.clone())
                        .part("file", part);
                    self.client
                        .post(url.clone())
                        .header("Authorization", &self.auth_header)
                        .multipart(form)
                });
                async move {
                    let request_builder =
                        request_builder.map_err(|e| ApiError::data("media", e.to_string()))?;
                    send_for_json::<MediaAttachment>(request_builder, "media").await
                }
            })
            .await?;

        info!("Media uploaded with id {}", media.id);
        Ok(media.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_mime_type() {
        assert_eq!(media_mime_type(Path::new("a/b/1.2.png")), "image/png");
        assert_eq!(media_mime_type(Path::new("clip.MP4")), "video/mp4");
        assert_eq!(media_mime_type(Path::new("speech.mp3")), "audio/mpeg");
        assert_eq!(
            media_mime_type(Path::new("noextension")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_media_mime_type_covers_other_audio_and_video() {
        assert_eq!(media_mime_type(Path::new("speech.ogg")), "audio/ogg");
        assert_eq!(media_mime_type(Path::new("speech.m4a")), "audio/m4a");
        assert_eq!(media_mime_type(Path::new("speech.wav")), "audio/wav");
        assert_eq!(media_mime_type(Path::new("render.webm")), "video/webm");
    }
}
