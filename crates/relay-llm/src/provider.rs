//! # Provider Adapter Trait
//!
//! Core abstraction for LLM backends. Every provider family implements
//! [`ProviderAdapter`] to turn a [`ModelRequest`] into a stream of
//! [`StreamChunk`]s: canonical events plus provider-shaped usage reports.
//!
//! The resolver hands adapters, never raw HTTP clients, to the rest of the
//! engine. Adapters are built once per `(family, attribution scope)` and
//! shared across concurrent calls, so they must be `Send + Sync`.

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

use async_trait::async_trait;
use futures::Stream;
use relay_core::events::CanonicalEvent;
use relay_core::messages::Message;
use serde::{Deserialize, Serialize};

use crate::usage::ProviderUsage;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Boxed stream of [`StreamChunk`]s returned by [`ProviderAdapter::open`].
pub type RawStream = Pin<Box<dyn Stream<Item = ProviderResult<StreamChunk>> + Send>>;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur during provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Connection dropped or could not be established.
    #[error("connection error: {message}")]
    Connection {
        /// Error description.
        message: String,
    },

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SSE stream parsing failed.
    #[error("SSE parse error: {message}")]
    SseParse {
        /// Error description.
        message: String,
    },

    /// Authentication failed (missing or invalid key).
    #[error("auth error: {message}")]
    Auth {
        /// Error description.
        message: String,
    },

    /// Rate limited by the provider.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Server-suggested delay in milliseconds, if any.
        retry_after_ms: Option<u64>,
        /// Error description.
        message: String,
    },

    /// Provider returned an API error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Provider-specific error code.
        code: Option<String>,
        /// Whether this error can be retried.
        retryable: bool,
    },

    /// The attempt exceeded its time budget.
    #[error("request timed out after {after_ms}ms")]
    Timeout {
        /// Configured budget in milliseconds.
        after_ms: u64,
    },

    /// Provider-specific error.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl ProviderError {
    /// Whether this error is transient: connection failures, timeouts,
    /// rate limits and 5xx responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_body()
                    || e.status().is_some_and(|s| {
                        s == reqwest::StatusCode::TOO_MANY_REQUESTS || s.is_server_error()
                    })
            }
            Self::Connection { .. } | Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Api { retryable, .. } => *retryable,
            Self::SseParse { .. } | Self::Auth { .. } | Self::Json(_) | Self::Other { .. } => {
                false
            }
        }
    }

    /// Server-suggested retry delay in milliseconds, if available.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::RateLimited { .. } => Some(429),
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Error category string for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(_) | Self::Connection { .. } => "network",
            Self::Json(_) | Self::SseParse { .. } => "parse",
            Self::Auth { .. } => "auth",
            Self::RateLimited { .. } => "rate_limit",
            Self::Api { .. } => "api",
            Self::Timeout { .. } => "timeout",
            Self::Other { .. } => "unknown",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Families and dialects
// ─────────────────────────────────────────────────────────────────────────────

/// Provider family. One adapter implementation exists per family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    /// Anthropic Messages API.
    Anthropic,
    /// `OpenAI` chat completions.
    #[serde(rename = "openai")]
    OpenAi,
    /// `OpenRouter` (OpenAI-compatible, reports cost).
    #[serde(rename = "openrouter")]
    OpenRouter,
    /// Google Gemini.
    Google,
}

impl ProviderFamily {
    /// All families.
    pub const ALL: [Self; 4] = [Self::Anthropic, Self::OpenAi, Self::OpenRouter, Self::Google];

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
            Self::Google => "google",
        }
    }

    /// Wire dialect this family speaks.
    pub fn dialect(self) -> Dialect {
        match self {
            Self::Anthropic => Dialect::AnthropicMessages,
            Self::OpenAi | Self::OpenRouter => Dialect::OpenAiChat,
            Self::Google => Dialect::GeminiGenerateContent,
        }
    }
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            "google" | "gemini" => Ok(Self::Google),
            other => Err(format!("unknown provider family: {other}")),
        }
    }
}

/// Request/response wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `POST /v1/messages` with typed SSE events.
    AnthropicMessages,
    /// `POST /chat/completions` with `choices[].delta` chunks.
    OpenAiChat,
    /// `POST /models/{model}:streamGenerateContent?alt=sse`.
    GeminiGenerateContent,
}

// ─────────────────────────────────────────────────────────────────────────────
// Request and stream types
// ─────────────────────────────────────────────────────────────────────────────

/// Per-call generation overrides.
///
/// All fields are optional; adapters use provider defaults when unset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Stop sequences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Per-attempt timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// One concrete request handed to an adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequest {
    /// Model id as the provider expects it (registry prefix stripped).
    pub model: String,
    /// Conversation.
    pub messages: Vec<Message>,
    /// Generation overrides.
    #[serde(default)]
    pub options: RequestOptions,
}

/// Item produced by an adapter stream.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamChunk {
    /// A canonical event to forward to the caller.
    Event(CanonicalEvent),
    /// A usage report. Later reports supersede earlier ones.
    Usage(ProviderUsage),
}

/// Core LLM adapter trait.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Family this adapter serves.
    fn family(&self) -> ProviderFamily;

    /// Send the request and return the provider's chunk stream.
    ///
    /// Errors before the stream opens (connection, non-2xx status) are
    /// returned directly; errors after that arrive as stream items.
    async fn open(&self, request: &ModelRequest) -> ProviderResult<RawStream>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
