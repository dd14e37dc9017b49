//! OpenAI client for chat completions and image generation.

use log::{debug, info};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::{build_bearer_auth_header, send_for_json};
use crate::config::{mask_token, require, ConfigError, OpenAiConfig};
use crate::error::ApiError;
use crate::retry::RetryPolicy;

/// Chat message for the completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// A chat completion as returned by the API. Unknown fields are kept so the
/// archived copy matches the original response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub created: i64,
    pub choices: Vec<ChatChoice>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletion {
    /// Text of the first choice.
    pub fn content(&self) -> Result<&str, ApiError> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ApiError::data("chat", "No content returned from OpenAI"))
    }
}

/// Options for the chat endpoint. Unset values fall back to the client defaults.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
}

/// Options for the image endpoint.
#[derive(Debug, Clone)]
pub struct ImageOptions {
    pub n: u32,
    pub size: String,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResponse {
    pub created: i64,
    pub data: Vec<ImageData>,
}

impl ImageResponse {
    /// URLs of the generated images in the order the API returned them.
    pub fn urls(&self) -> Result<Vec<&str>, ApiError> {
        let urls: Vec<&str> = self.data.iter().filter_map(|d| d.url.as_deref()).collect();
        if urls.is_empty() {
            return Err(ApiError::data("images", "No images from OpenAI"));
        }
        Ok(urls)
    }
}

/// A temperature in `[0, 1)` rounded to two decimals.
pub fn random_temperature() -> f32 {
    let value: f32 = rand::thread_rng().gen_range(0.0..1.0);
    (value * 100.0).floor() / 100.0
}

/// Client for the OpenAI REST API.
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
    auth_header: String,
    policy: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig, policy: RetryPolicy) -> Result<Self, ConfigError> {
        let api_key = require(&config.api_key, "OPENAI_API_KEY")?;
        debug!("OpenAI API key (masked): {}", mask_token(api_key));
        Ok(Self {
            client: Client::new(),
            config: config.clone(),
            auth_header: build_bearer_auth_header(api_key),
            policy,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Asks the chat endpoint for a single completion of `prompt`.
    pub async fn chat(&self, prompt: &str, options: &ChatOptions) -> Result<ChatCompletion, ApiError> {
        let model = options.model.as_deref().unwrap_or(&self.config.chat_model);
        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
            }],
            temperature: options.temperature.unwrap_or_else(random_temperature),
            max_tokens: options.max_tokens,
            frequency_penalty: options.frequency_penalty,
            presence_penalty: options.presence_penalty,
        };
        info!(
            "Requesting chat completion from {} (temperature {}, max tokens {:?})",
            model, body.temperature, body.max_tokens
        );

        let url = self.endpoint("chat/completions");
        let completion: ChatCompletion = self
            .policy
            .call("chat", || {
                send_for_json::<ChatCompletion>(
                    self.client
                        .post(&url)
                        .header("Authorization", &self.auth_header)
                        .json(&body),
                    "chat",
                )
            })
            .await?;

        info!("Received chat completion {}", completion.id);
        Ok(completion)
    }

    /// Generates images for `prompt`. An empty prompt is sent as a single space.
    pub async fn images(&self, prompt: &str, options: &ImageOptions) -> Result<ImageResponse, ApiError> {
        let prompt = if prompt.is_empty() { " " } else { prompt };
        let body = ImageRequest {
            prompt,
            n: options.n,
            size: &options.size,
        };
        info!("Requesting {} image(s) of {}", options.n, options.size);

        let url = self.endpoint("images/generations");
        self.policy
            .call("images", || {
                send_for_json::<ImageResponse>(
                    self.client
                        .post(&url)
                        .header("Authorization", &self.auth_header)
                        .json(&body),
                    "images",
                )
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_temperature_range() {
        for _ in 0..100 {
            let t = random_temperature();
            assert!((0.0..1.0).contains(&t));
            assert_eq!((t * 100.0).round() / 100.0, t);
        }
    }

    #[test]
    fn test_completion_content() {
        let completion: ChatCompletion = serde_json::from_str(
            r#"{"id": "chatcmpl-1", "created": 1, "model": "gpt-4",
                "choices": [{"message": {"role": "assistant", "content": " Squawk! "}}]}"#,
        )
        .unwrap();
        assert_eq!(completion.content().unwrap(), "Squawk!");
        assert_eq!(completion.extra["model"], "gpt-4");
    }

    #[test]
    fn test_completion_without_content_is_a_data_error() {
        let completion: ChatCompletion =
            serde_json::from_str(r#"{"id": "chatcmpl-1", "created": 1, "choices": []}"#).unwrap();
        assert_eq!(
            completion.content().unwrap_err().kind,
            crate::error::ErrorKind::Data
        );
    }

    #[test]
    fn test_chat_request_omits_unset_options() {
        let body = ChatRequest {
            model: "gpt-4",
            messages: vec![],
            temperature: 0.5,
            max_tokens: Some(350),
            frequency_penalty: None,
            presence_penalty: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["max_tokens"], 350);
        assert!(json.get("frequency_penalty").is_none());
    }

    #[test]
    fn test_image_urls() {
        let response: ImageResponse = serde_json::from_str(
            r#"{"created": 7, "data": [{"url": "https://a/1.png"}, {"url": "https://a/2.png"}]}"#,
        )
        .unwrap();
        assert_eq!(response.urls().unwrap(), vec!["https://a/1.png", "https://a/2.png"]);

        let empty: ImageResponse = serde_json::from_str(r#"{"created": 7, "data": []}"#).unwrap();
        assert!(empty.urls().is_err());
    }
}
