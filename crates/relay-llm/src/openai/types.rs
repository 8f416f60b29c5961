//! OpenAI-compatible chat completions wire types.
//!
//! Shared by `OpenAI` and `OpenRouter`. `OpenRouter` accepts the same body
//! plus a `usage.include` flag that makes the final chunk report a direct
//! `cost`, and attribution headers for the calling app.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::ProviderFamily;

/// Connection settings for one OpenAI-compatible adapter.
#[derive(Clone)]
pub struct OpenAiConfig {
    /// `OpenAi` or `OpenRouter`.
    pub family: ProviderFamily,
    /// Bearer token.
    pub api_key: String,
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// Attribution scope sent as `user`.
    pub user: Option<String>,
    /// `OpenRouter` `X-Title` header.
    pub app_title: Option<String>,
    /// `OpenRouter` `HTTP-Referer` header.
    pub app_url: Option<String>,
}

impl OpenAiConfig {
    /// Config for the `OpenAI` API.
    pub fn openai(api_key: String, base_url: String, user: Option<String>) -> Self {
        Self {
            family: ProviderFamily::OpenAi,
            api_key,
            base_url,
            user,
            app_title: None,
            app_url: None,
        }
    }

    /// Config for the `OpenRouter` API.
    pub fn openrouter(api_key: String, base_url: String, user: Option<String>) -> Self {
        Self {
            family: ProviderFamily::OpenRouter,
            ..Self::openai(api_key, base_url, user)
        }
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("family", &self.family)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("app_title", &self.app_title)
            .field("app_url", &self.app_url)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// Request body.
#[derive(Clone, Debug, Serialize)]
pub struct ChatRequest {
    /// Model id.
    pub model: String,
    /// Conversation.
    pub messages: Vec<ChatMessage>,
    /// Always true.
    pub stream: bool,
    /// Ask for a final usage chunk.
    pub stream_options: StreamOptions,
    /// Output budget (`OpenAI`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    /// Output budget (`OpenRouter`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Stop sequences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// End-user attribution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// `OpenRouter` usage accounting switch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageAccounting>,
}

/// One chat message.
#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`.
    pub role: &'static str,
    /// Plain-text content.
    pub content: String,
}

/// `stream_options` object.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct StreamOptions {
    /// Emit a usage-only chunk before `[DONE]`.
    pub include_usage: bool,
}

/// `OpenRouter` `usage` request object.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct UsageAccounting {
    /// Report token counts and cost in the final chunk.
    pub include: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream chunks
// ─────────────────────────────────────────────────────────────────────────────

/// One `data:` payload from the streaming response.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatChunk {
    /// Choice deltas; empty on the usage chunk.
    pub choices: Vec<ChunkChoice>,
    /// Usage, present on the final chunk only.
    pub usage: Option<ChunkUsage>,
    /// Mid-stream error (`OpenRouter`).
    pub error: Option<ChunkError>,
}

/// One choice in a chunk.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChunkChoice {
    /// Incremental content.
    pub delta: ChunkDelta,
    /// Set on the last chunk of the choice.
    pub finish_reason: Option<String>,
}

/// Incremental content.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChunkDelta {
    /// Response text.
    pub content: Option<String>,
    /// Reasoning text (`OpenRouter`).
    pub reasoning: Option<String>,
    /// Reasoning text (DeepSeek-style providers).
    pub reasoning_content: Option<String>,
}

/// Final usage report.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChunkUsage {
    /// Prompt tokens, cached included.
    pub prompt_tokens: u64,
    /// Completion tokens.
    pub completion_tokens: u64,
    /// Prompt breakdown.
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    /// Cost in USD (`OpenRouter`).
    pub cost: Option<f64>,
}

/// Prompt token breakdown.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PromptTokensDetails {
    /// Cached subset of the prompt.
    pub cached_tokens: u64,
}

/// Mid-stream error object.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChunkError {
    /// Human-readable message.
    pub message: String,
    /// Numeric or string code.
    pub code: Option<Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_usage_chunk_with_cost() {
        let chunk: ChatChunk = serde_json::from_str(
            r#"{"choices":[],"usage":{"prompt_tokens":100,"completion_tokens":7,"prompt_tokens_details":{"cached_tokens":64},"cost":0.002}}"#,
        )
        .unwrap();
        let usage = chunk.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 100);
        assert_eq!(usage.prompt_tokens_details.unwrap().cached_tokens, 64);
        assert_eq!(usage.cost, Some(0.002));
    }

    #[test]
    fn parses_error_chunk_with_numeric_code() {
        let chunk: ChatChunk =
            serde_json::from_str(r#"{"error":{"code":502,"message":"upstream died"}}"#).unwrap();
        let error = chunk.error.unwrap();
        assert_eq!(error.message, "upstream died");
        assert_eq!(error.code, Some(serde_json::json!(502)));
    }

    #[test]
    fn openrouter_config_inherits_fields() {
        let config = OpenAiConfig::openrouter("k".into(), "http://r".into(), Some("u".into()));
        assert_eq!(config.family, ProviderFamily::OpenRouter);
        assert_eq!(config.user.as_deref(), Some("u"));
        assert!(!format!("{config:?}").contains("\"k\""));
    }
}
