//! Low-level HTTP helpers shared by every API client.
//!
//! Requests are sent once per call; retrying is the caller's business (see
//! [`crate::retry::RetryPolicy`]). Every failure leaves this module already
//! classified as an [`ApiError`].

use log::{debug, error, info};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Sanitizes text for safe logging by truncating and escaping control characters.
///
/// Newlines and tabs become spaces, other control characters become `?`, and
/// anything past `max_len` bytes is cut at the nearest character boundary.
pub fn sanitize_for_logging(text: &str, max_len: usize) -> String {
    let sanitized: String = text
        .chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            c if c.is_control() => '?',
            c => c,
        })
        .collect();

    if sanitized.len() > max_len {
        let mut cut = max_len;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        format!(
            "{}... [truncated, {} total bytes]",
            &sanitized[..cut],
            text.len()
        )
    } else {
        sanitized
    }
}

/// Builds a `Bearer` Authorization header value.
pub fn build_bearer_auth_header(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Sends a request and returns the response if its status is a success.
pub(crate) async fn send_request(
    request_builder: RequestBuilder,
    operation_name: &str,
) -> Result<Response, ApiError> {
    debug!("Sending request for operation: {}", operation_name);

    let response = request_builder
        .send()
        .await
        .map_err(|e| ApiError::from_reqwest(operation_name, &e))?;

    let status = response.status();
    info!(
        "Received response with status: {} for operation: {}",
        status, operation_name
    );

    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    error!("Operation '{}' failed - Status: {}", operation_name, status);
    debug!(
        "Error response for '{}': {}",
        operation_name,
        sanitize_for_logging(&error_text, 200)
    );
    Err(ApiError::from_status(
        operation_name,
        status.as_u16(),
        &error_text,
    ))
}

/// Sends a request and decodes a JSON body.
pub(crate) async fn send_for_json<T: DeserializeOwned>(
    request_builder: RequestBuilder,
    operation_name: &str,
) -> Result<T, ApiError> {
    let response = send_request(request_builder, operation_name).await?;
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::from_reqwest(operation_name, &e))?;
    debug!(
        "Response summary for '{}': {} bytes received",
        operation_name,
        body.len()
    );
    serde_json::from_str(&body).map_err(|e| {
        ApiError::data(
            operation_name,
            format!("{} in '{}'", e, sanitize_for_logging(&body, 200)),
        )
    })
}

/// Sends a request and returns the raw body bytes.
pub(crate) async fn send_for_bytes(
    request_builder: RequestBuilder,
    operation_name: &str,
) -> Result<Vec<u8>, ApiError> {
    let response = send_request(request_builder, operation_name).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::from_reqwest(operation_name, &e))?;
    debug!(
        "Response summary for '{}': {} bytes received",
        operation_name,
        bytes.len()
    );
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_for_logging_flattens_control_characters() {
        assert_eq!(sanitize_for_logging("a\nb\tc\u{7}", 100), "a b c?");
    }

    #[test]
    fn test_sanitize_for_logging_truncates_on_char_boundary() {
        let text = "🦜🦜🦜";
        let sanitized = sanitize_for_logging(text, 5);
        assert_eq!(sanitized, "🦜... [truncated, 12 total bytes]");
    }

    #[test]
    fn test_bearer_header() {
        assert_eq!(build_bearer_auth_header("abc"), "Bearer abc");
    }
}
