//! Anthropic Messages API wire types.
//!
//! Request types serialize to the `POST /v1/messages` body. SSE event types
//! mirror the raw JSON of the streaming response; event and delta types the
//! engine does not use deserialize into catch-all variants so a new event
//! type never fails a stream.

use serde::{Deserialize, Serialize};

/// API version header value.
pub const API_VERSION: &str = "2023-06-01";

/// Output budget used when the caller sets none.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Connection settings for one Anthropic adapter.
#[derive(Clone)]
pub struct AnthropicConfig {
    /// API key sent as `x-api-key`.
    pub api_key: String,
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// Attribution scope sent as `metadata.user_id`.
    pub user_id: Option<String>,
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("user_id", &self.user_id)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// Request body.
#[derive(Clone, Debug, Serialize)]
pub struct AnthropicRequest {
    /// Model id.
    pub model: String,
    /// Output budget.
    pub max_tokens: u32,
    /// Conversation without system messages.
    pub messages: Vec<AnthropicMessageParam>,
    /// Joined system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Always true.
    pub stream: bool,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Stop sequences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Usage attribution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AnthropicMetadata>,
}

/// One conversation turn.
#[derive(Clone, Debug, Serialize)]
pub struct AnthropicMessageParam {
    /// `user` or `assistant`.
    pub role: &'static str,
    /// Plain-text content.
    pub content: String,
}

/// Request metadata.
#[derive(Clone, Debug, Serialize)]
pub struct AnthropicMetadata {
    /// Opaque end-user id for abuse tracking and attribution.
    pub user_id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE events
// ─────────────────────────────────────────────────────────────────────────────

/// One `data:` payload from the streaming response.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicSseEvent {
    /// First event; carries prompt usage.
    MessageStart {
        /// Message envelope.
        message: SseMessage,
    },
    /// Incremental content.
    ContentBlockDelta {
        /// Block index.
        #[serde(default)]
        index: usize,
        /// The delta.
        delta: SseDelta,
    },
    /// Message-level update; carries cumulative output usage.
    MessageDelta {
        /// Usage update.
        #[serde(default)]
        usage: Option<SseUsage>,
    },
    /// Error reported inside the stream.
    Error {
        /// Error details.
        error: SseError,
    },
    /// `content_block_start`, `content_block_stop`, `message_stop`, `ping`
    /// and anything newer.
    #[serde(other)]
    Other,
}

/// Message object in `message_start`.
#[derive(Clone, Debug, Deserialize)]
pub struct SseMessage {
    /// Usage at stream start.
    #[serde(default)]
    pub usage: SseUsage,
}

/// Usage counters. Every field is optional on the wire.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SseUsage {
    /// Non-cached input tokens.
    pub input_tokens: Option<u64>,
    /// Output tokens so far.
    pub output_tokens: Option<u64>,
    /// Tokens written to cache.
    pub cache_creation_input_tokens: Option<u64>,
    /// Tokens read from cache.
    pub cache_read_input_tokens: Option<u64>,
}

/// Delta payload.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SseDelta {
    /// Response text.
    TextDelta {
        /// Fragment.
        text: String,
    },
    /// Extended thinking.
    ThinkingDelta {
        /// Fragment.
        thinking: String,
    },
    /// Signatures, tool input JSON and anything newer.
    #[serde(other)]
    Other,
}

/// Error object in an `error` event.
#[derive(Clone, Debug, Deserialize)]
pub struct SseError {
    /// Error type, e.g. `overloaded_error`.
    #[serde(rename = "type", default)]
    pub error_type: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
