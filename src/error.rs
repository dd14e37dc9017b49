//! Error types shared by every outbound API client.
//!
//! Transport-specific failures (reqwest errors, non-2xx responses, unparseable
//! bodies) are mapped once, at the client boundary, into an [`ApiError`] with a
//! small closed [`ErrorKind`]. The retry policy and the job driver only ever
//! look at the kind.

use std::fmt;

use crate::api::sanitize_for_logging;

/// Classification of a failed API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No HTTP status was received (DNS, connect, reset, timeout).
    Network,
    /// The credentials were rejected (401). Never retried.
    Auth,
    /// The service is throttling us (429).
    RateLimit,
    /// Any other non-success status.
    Server,
    /// The response arrived but its content is unusable. Never retried.
    Data,
}

impl ErrorKind {
    /// Whether a failure of this kind is worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::RateLimit | ErrorKind::Server
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimit => "rate-limit",
            ErrorKind::Server => "server",
            ErrorKind::Data => "data",
        };
        f.write_str(name)
    }
}

/// A classified failure of one API call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", self.describe())]
pub struct ApiError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub endpoint: String,
    pub message: Option<String>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, endpoint: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            endpoint: endpoint.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// A malformed or incomplete response body.
    pub fn data(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Data, endpoint).with_message(message)
    }

    /// Classifies a non-success HTTP response.
    ///
    /// The machine-readable message is taken from the usual error shapes
    /// (`{"error": {"message": ..}}`, `{"error": ".."}`, `{"message": ..}`),
    /// falling back to a sanitised excerpt of the raw body.
    pub fn from_status(endpoint: impl Into<String>, status: u16, body: &str) -> Self {
        let kind = match status {
            401 => ErrorKind::Auth,
            429 => ErrorKind::RateLimit,
            _ => ErrorKind::Server,
        };
        let mut error = Self::new(kind, endpoint).with_status(status);
        error.message = extract_error_message(body);
        error
    }

    /// Classifies a reqwest failure. Errors that carry a status are treated
    /// like [`ApiError::from_status`]; everything else is a network failure.
    pub fn from_reqwest(endpoint: impl Into<String>, err: &reqwest::Error) -> Self {
        let endpoint = endpoint.into();
        match err.status() {
            Some(status) => Self::from_status(endpoint, status.as_u16(), "")
                .with_message(err.to_string()),
            None if err.is_decode() => Self::data(endpoint, err.to_string()),
            None => Self::new(ErrorKind::Network, endpoint).with_message(err.to_string()),
        }
    }

    /// Authentication failures stop the whole job.
    pub fn is_fatal(&self) -> bool {
        self.kind == ErrorKind::Auth
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    fn describe(&self) -> String {
        let mut text = match self.kind {
            ErrorKind::Network => format!("No response from server for {}", self.endpoint),
            ErrorKind::Auth => format!(
                "Unable to process request to {}, please check your API key",
                self.endpoint
            ),
            ErrorKind::RateLimit => format!("Too many requests to {}", self.endpoint),
            ErrorKind::Server => format!("Request to {} failed", self.endpoint),
            ErrorKind::Data => format!("Unusable response from {}", self.endpoint),
        };
        if let Some(status) = self.status {
            text.push_str(&format!(" ({})", status));
        }
        if let Some(message) = &self.message {
            text.push_str(": ");
            text.push_str(message);
        }
        text
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let found = ["/error/message", "/error", "/message", "/detail/message"]
            .iter()
            .find_map(|pointer| value.pointer(pointer).and_then(|v| v.as_str()));
        if let Some(message) = found {
            return Some(message.to_string());
        }
    }
    Some(sanitize_for_logging(body, 200))
}

/// Failure of a threaded publish.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Nothing was given to publish.
    #[error("Refusing to publish an empty message")]
    EmptyMessage,

    /// Chunk `index` could not be published. `published` chunks before it
    /// remain visible; `first_post_url` is set when `published > 0`.
    #[error("Failed to publish chunk {index} after {published} published chunk(s): {source}")]
    Chain {
        index: usize,
        published: usize,
        first_post_url: Option<String>,
        #[source]
        source: ApiError,
    },
}

impl PublishError {
    pub fn is_fatal(&self) -> bool {
        match self {
            PublishError::EmptyMessage => false,
            PublishError::Chain { source, .. } => source.is_fatal(),
        }
    }
}
