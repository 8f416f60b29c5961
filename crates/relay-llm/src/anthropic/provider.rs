//! Anthropic adapter implementing [`ProviderAdapter`].

use async_trait::async_trait;
use relay_core::messages::{Role, split_system};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, instrument};

use super::stream_handler::{StreamState, process_sse_event};
use super::types::{
    API_VERSION, AnthropicConfig, AnthropicMessageParam, AnthropicMetadata, AnthropicRequest,
    AnthropicSseEvent, DEFAULT_MAX_TOKENS,
};
use crate::provider::{
    ModelRequest, ProviderAdapter, ProviderError, ProviderFamily, ProviderResult, RawStream,
};
use crate::sse::SseParserOptions;
use crate::stream_pipeline::{send_checked, sse_to_chunk_stream};

/// Anthropic Messages API adapter.
#[derive(Clone, Debug)]
pub struct AnthropicAdapter {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    /// Create an adapter sharing `client`'s connection pool.
    pub fn new(config: AnthropicConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn build_headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let _ = headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        let _ = headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.config.api_key).map_err(|e| ProviderError::Auth {
                message: format!("invalid API key header: {e}"),
            })?,
        );
        Ok(headers)
    }

    /// Build the request body.
    pub fn build_request(&self, request: &ModelRequest) -> AnthropicRequest {
        let (system, turns) = split_system(&request.messages);
        let messages = turns
            .into_iter()
            .map(|m| AnthropicMessageParam {
                role: match m.role {
                    Role::Assistant => "assistant",
                    Role::User | Role::System => "user",
                },
                content: m.content.clone(),
            })
            .collect();

        AnthropicRequest {
            model: request.model.clone(),
            max_tokens: request.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system,
            stream: true,
            temperature: request.options.temperature,
            stop_sequences: request.options.stop_sequences.clone(),
            metadata: self.config.user_id.as_ref().map(|user_id| AnthropicMetadata {
                user_id: user_id.clone(),
            }),
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Anthropic
    }

    #[instrument(skip_all, fields(provider = "anthropic", model = %request.model))]
    async fn open(&self, request: &ModelRequest) -> ProviderResult<RawStream> {
        let body = self.build_request(request);
        let url = format!("{}/v1/messages", self.config.base_url);

        debug!(
            max_tokens = body.max_tokens,
            message_count = body.messages.len(),
            has_system = body.system.is_some(),
            "sending Anthropic request"
        );

        let response = send_checked(
            ProviderFamily::Anthropic,
            self.client.post(&url).headers(self.build_headers()?).json(&body),
        )
        .await?;

        Ok(sse_to_chunk_stream::<AnthropicSseEvent, _, _>(
            ProviderFamily::Anthropic,
            response,
            &SseParserOptions::default(),
            StreamState::default(),
            process_sse_event,
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
