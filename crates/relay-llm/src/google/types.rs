//! Gemini `streamGenerateContent` wire types.

use serde::{Deserialize, Serialize};

/// Connection settings for one Gemini adapter.
#[derive(Clone)]
pub struct GoogleConfig {
    /// API key sent as `x-goog-api-key`.
    pub api_key: String,
    /// Base URL without a trailing slash.
    pub base_url: String,
}

impl std::fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// Request body.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    /// Conversation with `user` / `model` roles.
    pub contents: Vec<GeminiContent>,
    /// System prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    /// Generation parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

/// One conversation turn.
#[derive(Clone, Debug, Serialize)]
pub struct GeminiContent {
    /// `user` or `model`.
    pub role: &'static str,
    /// Text parts.
    pub parts: Vec<TextPart>,
}

/// A plain text part.
#[derive(Clone, Debug, Serialize)]
pub struct TextPart {
    /// Text.
    pub text: String,
}

/// System instruction.
#[derive(Clone, Debug, Serialize)]
pub struct SystemInstruction {
    /// Text parts.
    pub parts: Vec<TextPart>,
}

/// Generation parameters.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Output budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Stop sequences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

impl GenerationConfig {
    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.max_output_tokens.is_none() && self.temperature.is_none() && self.stop_sequences.is_none()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream chunks
// ─────────────────────────────────────────────────────────────────────────────

/// One `data:` payload from the streaming response.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeminiStreamChunk {
    /// Candidates; the engine reads the first.
    pub candidates: Vec<GeminiCandidate>,
    /// Cumulative usage.
    pub usage_metadata: Option<UsageMetadata>,
    /// In-stream error.
    pub error: Option<GeminiApiError>,
}

/// One candidate.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeminiCandidate {
    /// Content delta.
    pub content: Option<CandidateContent>,
    /// Set on the last chunk.
    pub finish_reason: Option<String>,
}

/// Candidate content.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CandidateContent {
    /// Parts.
    pub parts: Vec<CandidatePart>,
}

/// One response part. Non-text parts deserialize with `text = None`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CandidatePart {
    /// Text.
    pub text: Option<String>,
    /// Whether the text is a thought summary.
    pub thought: bool,
}

/// Usage counters.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageMetadata {
    /// Prompt tokens, cached included.
    pub prompt_token_count: u64,
    /// Visible output tokens.
    pub candidates_token_count: u64,
    /// Cached subset of the prompt.
    pub cached_content_token_count: u64,
    /// Reasoning tokens.
    pub thoughts_token_count: u64,
}

/// Error object.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct GeminiApiError {
    /// HTTP-like code.
    pub code: i32,
    /// Message.
    pub message: String,
    /// Status string, e.g. `RESOURCE_EXHAUSTED`.
    pub status: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
