//! Gemini adapter implementing [`ProviderAdapter`].

use async_trait::async_trait;
use relay_core::messages::{Role, split_system};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, instrument};

use super::stream_handler::process_chunk;
use super::types::{
    GeminiContent, GeminiRequest, GeminiStreamChunk, GenerationConfig, GoogleConfig,
    SystemInstruction, TextPart,
};
use crate::provider::{
    ModelRequest, ProviderAdapter, ProviderError, ProviderFamily, ProviderResult, RawStream,
};
use crate::sse::SseParserOptions;
use crate::stream_pipeline::{send_checked, sse_to_chunk_stream};

/// Gemini `streamGenerateContent` adapter.
#[derive(Clone, Debug)]
pub struct GoogleAdapter {
    config: GoogleConfig,
    client: reqwest::Client,
}

impl GoogleAdapter {
    /// Create an adapter sharing `client`'s connection pool.
    pub fn new(config: GoogleConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn build_headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let _ = headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.config.api_key).map_err(|e| ProviderError::Auth {
                message: format!("invalid API key header: {e}"),
            })?,
        );
        Ok(headers)
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/models/{model}:streamGenerateContent?alt=sse",
            self.config.base_url
        )
    }

    /// Build the request body.
    pub fn build_request(request: &ModelRequest) -> GeminiRequest {
        let (system, turns) = split_system(&request.messages);
        let contents = turns
            .into_iter()
            .map(|m| GeminiContent {
                role: match m.role {
                    Role::Assistant => "model",
                    Role::User | Role::System => "user",
                },
                parts: vec![TextPart {
                    text: m.content.clone(),
                }],
            })
            .collect();

        let generation_config = GenerationConfig {
            max_output_tokens: request.options.max_tokens,
            temperature: request.options.temperature,
            stop_sequences: request.options.stop_sequences.clone(),
        };

        GeminiRequest {
            contents,
            system_instruction: system.map(|text| SystemInstruction {
                parts: vec![TextPart { text }],
            }),
            generation_config: (!generation_config.is_empty()).then_some(generation_config),
        }
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Google
    }

    #[instrument(skip_all, fields(provider = "google", model = %request.model))]
    async fn open(&self, request: &ModelRequest) -> ProviderResult<RawStream> {
        let body = Self::build_request(request);
        let url = self.stream_url(&request.model);

        debug!(
            content_count = body.contents.len(),
            has_system = body.system_instruction.is_some(),
            "sending Gemini request"
        );

        let response = send_checked(
            ProviderFamily::Google,
            self.client.post(&url).headers(self.build_headers()?).json(&body),
        )
        .await?;

        Ok(sse_to_chunk_stream::<GeminiStreamChunk, _, _>(
            ProviderFamily::Google,
            response,
            &SseParserOptions::default(),
            (),
            process_chunk,
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
