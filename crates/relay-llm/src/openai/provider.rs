//! OpenAI-compatible adapter implementing [`ProviderAdapter`].

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, instrument};

use super::stream_handler::process_chunk;
use super::types::{ChatChunk, ChatMessage, ChatRequest, OpenAiConfig, StreamOptions, UsageAccounting};
use crate::provider::{
    ModelRequest, ProviderAdapter, ProviderError, ProviderFamily, ProviderResult, RawStream,
};
use crate::sse::SseParserOptions;
use crate::stream_pipeline::{send_checked, sse_to_chunk_stream};

/// Chat completions adapter for `OpenAI` and `OpenRouter`.
#[derive(Clone, Debug)]
pub struct OpenAiAdapter {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiAdapter {
    /// Create an adapter sharing `client`'s connection pool.
    pub fn new(config: OpenAiConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn is_openrouter(&self) -> bool {
        self.config.family == ProviderFamily::OpenRouter
    }

    fn build_headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let _ = headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.config.api_key)).map_err(|e| {
                ProviderError::Auth {
                    message: format!("invalid API key header: {e}"),
                }
            })?,
        );
        if self.is_openrouter() {
            let header = |value: &Option<String>| {
                value.as_deref().and_then(|v| HeaderValue::from_str(v).ok())
            };
            if let Some(value) = header(&self.config.app_url) {
                let _ = headers.insert("HTTP-Referer", value);
            }
            if let Some(value) = header(&self.config.app_title) {
                let _ = headers.insert("X-Title", value);
            }
        }
        Ok(headers)
    }

    /// Build the request body.
    pub fn build_request(&self, request: &ModelRequest) -> ChatRequest {
        let messages = request
            .messages
            .iter()
            .map(|m| ChatMessage {
                role: m.role.as_str(),
                content: m.content.clone(),
            })
            .collect();
        let openrouter = self.is_openrouter();
        let max_tokens = request.options.max_tokens;

        ChatRequest {
            model: request.model.clone(),
            messages,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
            max_completion_tokens: if openrouter { None } else { max_tokens },
            max_tokens: if openrouter { max_tokens } else { None },
            temperature: request.options.temperature,
            stop: request.options.stop_sequences.clone(),
            user: self.config.user.clone(),
            usage: openrouter.then_some(UsageAccounting { include: true }),
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn family(&self) -> ProviderFamily {
        self.config.family
    }

    #[instrument(skip_all, fields(provider = %self.config.family, model = %request.model))]
    async fn open(&self, request: &ModelRequest) -> ProviderResult<RawStream> {
        let family = self.config.family;
        let body = self.build_request(request);
        let url = format!("{}/chat/completions", self.config.base_url);

        debug!(
            message_count = body.messages.len(),
            has_user = body.user.is_some(),
            "sending chat completions request"
        );

        let response = send_checked(
            family,
            self.client.post(&url).headers(self.build_headers()?).json(&body),
        )
        .await?;

        Ok(sse_to_chunk_stream::<ChatChunk, _, _>(
            family,
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

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use relay_core::events::CanonicalEvent;
    use relay_core::messages::Message;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::provider::{RequestOptions, StreamChunk};
    use crate::usage::ProviderUsage;

    fn request() -> ModelRequest {
        ModelRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::system("sys"), Message::user("hi")],
            options: RequestOptions {
                max_tokens: Some(64),
                ..RequestOptions::default()
            },
        }
    }

    #[test]
    fn openai_body_uses_max_completion_tokens() {
        let adapter = OpenAiAdapter::new(
            OpenAiConfig::openai("k".into(), "http://x".into(), Some("attr".into())),
            reqwest::Client::new(),
        );
        let json = serde_json::to_value(adapter.build_request(&request())).unwrap();
        assert_eq!(json["max_completion_tokens"], 64);
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("usage").is_none());
        assert_eq!(json["user"], "attr");
        assert_eq!(json["stream_options"]["include_usage"], true);
        assert_eq!(json["messages"][0]["role"], "system");
    }

    #[test]
    fn openrouter_body_and_headers() {
        let mut config = OpenAiConfig::openrouter("k".into(), "http://x".into(), None);
        config.app_title = Some("relay".into());
        config.app_url = Some("https://example.com".into());
        let adapter = OpenAiAdapter::new(config, reqwest::Client::new());

        let json = serde_json::to_value(adapter.build_request(&request())).unwrap();
        assert_eq!(json["max_tokens"], 64);
        assert_eq!(json["usage"]["include"], true);

        let headers = adapter.build_headers().unwrap();
        assert_eq!(headers["X-Title"], "relay");
        assert_eq!(headers["HTTP-Referer"], "https://example.com");
        assert_eq!(headers[AUTHORIZATION], "Bearer k");
    }

    #[tokio::test]
    async fn streams_text_and_cost() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            ": OPENROUTER PROCESSING\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":20,\"completion_tokens\":1,\"prompt_tokens_details\":{\"cached_tokens\":4},\"cost\":0.001}}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer k"))
            .and(body_partial_json(serde_json::json!({"usage": {"include": true}})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .expect(1)
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::new(
            OpenAiConfig::openrouter("k".into(), server.uri(), None),
            reqwest::Client::new(),
        );
        let chunks: Vec<_> = adapter
            .open(&request())
            .await
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(
            chunks,
            vec![
                StreamChunk::Event(CanonicalEvent::text("Hi")),
                StreamChunk::Usage(ProviderUsage::OpenAi {
                    prompt_tokens: 20,
                    completion_tokens: 1,
                    cached_tokens: 4,
                    cost: Some(0.001),
                }),
            ]
        );
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500).set_body_string(r#"{"error":{"message":"boom","type":"server_error"}}"#),
            )
            .mount(&server)
            .await;
        let adapter = OpenAiAdapter::new(
            OpenAiConfig::openai("k".into(), server.uri(), None),
            reqwest::Client::new(),
        );
        let err = adapter.open(&request()).await.err().unwrap();
        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(500));
    }
}
