//! Non-2xx response handling shared by all adapters.
//!
//! Handles the error envelope formats seen across providers:
//! - Standard: `{"error": {"message": "...", "type": "..."}}`
//! - Google:   `{"error": {"message": "...", "status": "..."}}`
//! - Detail:   `{"detail": "..."}`
//! - Flat:     `{"message": "...", "code": "..."}`

use relay_core::retry::parse_retry_after_header;
use relay_core::text::truncate_with_suffix;
use serde_json::Value;
use tracing::error;

use crate::provider::{ProviderError, ProviderFamily};

/// Longest raw body echoed into an error message.
const MAX_BODY_IN_MESSAGE: usize = 500;

/// Parsed API error information.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiErrorInfo {
    /// Human-readable error message.
    pub message: String,
    /// Provider-specific error code (e.g., `"overloaded_error"`, `"NOT_FOUND"`).
    pub code: Option<String>,
    /// Whether the request can be retried (408, 429 or 5xx).
    pub retryable: bool,
}

/// Whether an HTTP status indicates a transient failure.
pub fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

/// Parse an API error response body into structured error info.
///
/// Tries the known envelope formats in order, falling back to the raw body.
pub fn parse_api_error(body: &str, status: u16) -> ApiErrorInfo {
    let retryable = is_transient_status(status);
    let raw = || ApiErrorInfo {
        message: format!(
            "HTTP {status}: {}",
            truncate_with_suffix(body, MAX_BODY_IN_MESSAGE, "...")
        ),
        code: None,
        retryable,
    };

    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return raw();
    };

    if let Some(msg) = json["error"]["message"].as_str() {
        let code = json["error"]["type"]
            .as_str()
            .or_else(|| json["error"]["status"].as_str())
            .or_else(|| json["error"]["code"].as_str())
            .map(String::from);
        return ApiErrorInfo {
            message: msg.to_string(),
            code,
            retryable,
        };
    }

    if let Some(msg) = json["detail"].as_str().or_else(|| json["message"].as_str()) {
        let code = json["code"]
            .as_str()
            .or_else(|| json["type"].as_str())
            .map(String::from);
        return ApiErrorInfo {
            message: msg.to_string(),
            code,
            retryable,
        };
    }

    raw()
}

/// Turn a failed HTTP response into a [`ProviderError`].
///
/// 401/403 become [`ProviderError::Auth`], 429 becomes
/// [`ProviderError::RateLimited`] carrying any `Retry-After` hint, and
/// everything else becomes [`ProviderError::Api`].
pub async fn error_from_response(
    provider: ProviderFamily,
    response: reqwest::Response,
) -> ProviderError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after_header);
    let body = response.text().await.unwrap_or_default();
    let info = parse_api_error(&body, status);

    error!(
        provider = %provider,
        status,
        code = info.code.as_deref().unwrap_or("unknown"),
        retryable = info.retryable,
        "provider API error"
    );

    match status {
        401 | 403 => ProviderError::Auth {
            message: info.message,
        },
        429 => ProviderError::RateLimited {
            retry_after_ms: retry_after,
            message: info.message,
        },
        _ => ProviderError::Api {
            status,
            message: info.message,
            code: info.code,
            retryable: info.retryable,
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
