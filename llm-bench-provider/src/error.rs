//! Mapping of HTTP outcomes onto [`ProviderError`].

use llm_bench_core::ProviderError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// OpenAI-style error envelope
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Pull the human-readable message out of an error body, falling back to the raw text.
fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => format!("{}: {}", status, envelope.error.message),
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => format!("{}: {}", status, body.trim()),
    }
}

/// Longest server-requested wait that is honoured; larger hints are clamped.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// `Retry-After` in delta-seconds form, clamped to [`MAX_RETRY_AFTER`].
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .map_or(MAX_RETRY_AFTER, |delay| delay.min(MAX_RETRY_AFTER))
        })
}

/// Classify a non-success response.
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> ProviderError {
    let message = error_message(status, body);

    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { retry_after },
        StatusCode::REQUEST_TIMEOUT => ProviderError::Transient(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Authentication(message),
        s if s.is_server_error() => ProviderError::Transient(message),
        s if s.is_client_error() => ProviderError::InvalidRequest(message),
        _ => ProviderError::InvalidResponse(message),
    }
}

/// Classify a transport-level failure.
pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else if err.is_connect() || err.is_request() {
        ProviderError::Network(err.to_string())
    } else if err.is_decode() {
        ProviderError::InvalidResponse(err.to_string())
    } else if err.is_builder() {
        ProviderError::InvalidRequest(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}
