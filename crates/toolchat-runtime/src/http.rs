//! Shared reqwest plumbing

use serde_json::Value;
use toolchat_core::error::{ChatError, FailureSignal, Result};

pub(crate) fn transport_error(err: &reqwest::Error) -> ChatError {
    FailureSignal::Network {
        message: err.to_string(),
        timeout: err.is_timeout(),
    }
    .into()
}

/// Read a response body, turning non-2xx statuses into classified errors
pub(crate) async fn read_body(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await.map_err(|e| transport_error(&e))?;

    if !status.is_success() {
        return Err(FailureSignal::HttpStatus {
            status: status.as_u16(),
            body,
        }
        .into());
    }

    Ok(body)
}

pub(crate) fn parse_json(body: &str) -> Result<Value> {
    if body.trim().is_empty() {
        return Err(ChatError::malformed("empty response body"));
    }
    Ok(serde_json::from_str(body)?)
}

/// Parse a user-supplied base URL
pub(crate) fn parse_url(raw: &str) -> Result<url::Url> {
    url::Url::parse(raw.trim())
        .map_err(|e| ChatError::Configuration(format!("Invalid URL '{raw}': {e}")))
}
