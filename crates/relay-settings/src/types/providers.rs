//! Provider credentials and endpoints.

use serde::{Deserialize, Serialize};

/// Default Anthropic API base URL.
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
/// Default `OpenAI` API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default `OpenRouter` API base URL.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
/// Default Gemini API base URL.
pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Settings for every supported provider family.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    /// Anthropic Messages API.
    pub anthropic: ProviderEndpoint,
    /// `OpenAI` chat completions.
    pub openai: ProviderEndpoint,
    /// `OpenRouter` (OpenAI-compatible chat with cost reporting).
    pub openrouter: OpenRouterSettings,
    /// Google Gemini.
    pub google: ProviderEndpoint,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            anthropic: ProviderEndpoint::with_base_url(ANTHROPIC_BASE_URL),
            openai: ProviderEndpoint::with_base_url(OPENAI_BASE_URL),
            openrouter: OpenRouterSettings::default(),
            google: ProviderEndpoint::with_base_url(GOOGLE_BASE_URL),
        }
    }
}

/// API key and base URL for one provider.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderEndpoint {
    /// API key. Usually supplied through the environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// API base URL without a trailing slash.
    pub base_url: String,
}

impl ProviderEndpoint {
    fn with_base_url(base_url: &str) -> Self {
        Self {
            api_key: None,
            base_url: base_url.to_string(),
        }
    }
}

// Keys stay out of logs.
impl std::fmt::Debug for ProviderEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEndpoint")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// `OpenRouter` endpoint plus app attribution headers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenRouterSettings {
    /// API key and base URL.
    #[serde(flatten)]
    pub endpoint: ProviderEndpoint,
    /// Sent as `X-Title`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_title: Option<String>,
    /// Sent as `HTTP-Referer`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_url: Option<String>,
}

impl Default for OpenRouterSettings {
    fn default() -> Self {
        Self {
            endpoint: ProviderEndpoint::with_base_url(OPENROUTER_BASE_URL),
            app_title: None,
            app_url: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
