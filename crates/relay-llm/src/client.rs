//! # Client Facade
//!
//! [`LlmClient`] is what the agent loop talks to. It turns a [`CallRequest`]
//! into an [`AttemptPlan`], drives it through the [`RetryExecutor`], and
//! wraps the winning provider stream in the stream normalizer.
//!
//! Two attempt shapes:
//!
//! - **Streaming** ([`LlmClient::stream_events`], [`LlmClient::stream_text`]):
//!   an attempt succeeds as soon as the provider stream opens. The stream is
//!   then committed; a failure after that point ends the stream with an
//!   error and is never retried, since the caller may already hold output.
//! - **Non-streaming** ([`LlmClient::complete`]): the attempt drains the
//!   stream before returning, so a transient failure anywhere in it is
//!   retried or falls back like an open failure.
//!
//! The per-attempt timeout covers the open for streaming calls and the
//! whole attempt for non-streaming calls.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use relay_core::events::CanonicalEvent;
use relay_core::ids::{AttributionId, RequestId, SessionId, UserId};
use relay_core::messages::Message;
use relay_core::usage::UsageSummary;
use relay_settings::{RelaySettings, StreamErrorPolicy};
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::error::{CallOutcome, DispatchError, DispatchResult};
use crate::executor::{Attempt, RetryExecutor};
use crate::live_input::LiveInputRegistry;
use crate::normalizer::{NormalizedStream, StreamMeta, TextStream, normalize_stream};
use crate::plan::{AttemptPlan, ModelSelection};
use crate::provider::{ModelRequest, ProviderError, RequestOptions};
use crate::resolver::{AdapterFactory, ProviderResolver};
use crate::usage::UsageSink;

/// Identifiers carried by one call.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    /// Client session.
    pub session_id: SessionId,
    /// Request id checked against the live-input gate.
    pub request_id: RequestId,
    /// End user, if known.
    pub user_id: Option<UserId>,
    /// Usage attribution scope forwarded to providers that support it.
    pub attribution_id: Option<AttributionId>,
}

/// One call into the engine.
#[derive(Clone, Debug)]
pub struct CallRequest {
    /// Conversation, oldest first.
    pub messages: Vec<Message>,
    /// Model, config or ordered fallback list.
    pub models: ModelSelection,
    /// Call identifiers.
    pub context: CallContext,
    /// Generation overrides.
    pub options: RequestOptions,
}

impl CallRequest {
    /// A request with fresh identifiers and no overrides.
    pub fn new(messages: Vec<Message>, models: impl Into<ModelSelection>) -> Self {
        Self {
            messages,
            models: models.into(),
            context: CallContext::default(),
            options: RequestOptions::default(),
        }
    }

    /// Replace the call identifiers.
    #[must_use]
    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = context;
        self
    }

    /// Replace the generation overrides.
    #[must_use]
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// Result of a non-streaming call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Completion {
    /// Concatenated response text.
    pub text: String,
    /// Concatenated reasoning text.
    pub reasoning: String,
    /// Unified usage of the successful attempt.
    pub usage: UsageSummary,
}

/// Entry point for streaming and non-streaming calls.
#[derive(Clone)]
pub struct LlmClient {
    executor: RetryExecutor,
    live_inputs: Arc<LiveInputRegistry>,
    sink: Arc<dyn UsageSink>,
    default_retries: u32,
    error_policy: StreamErrorPolicy,
    request_timeout_ms: Option<u64>,
}

impl fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmClient")
            .field("executor", &self.executor)
            .field("default_retries", &self.default_retries)
            .field("error_policy", &self.error_policy)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    /// Client with HTTP adapters built from `settings.providers`.
    pub fn new(
        settings: &RelaySettings,
        live_inputs: Arc<LiveInputRegistry>,
        sink: Arc<dyn UsageSink>,
    ) -> DispatchResult<Self> {
        let resolver = ProviderResolver::from_settings(settings, reqwest::Client::new())?;
        Ok(Self::assemble(settings, resolver, live_inputs, sink))
    }

    /// Client with adapters from a custom factory.
    pub fn with_factory(
        settings: &RelaySettings,
        factory: Arc<dyn AdapterFactory>,
        live_inputs: Arc<LiveInputRegistry>,
        sink: Arc<dyn UsageSink>,
    ) -> DispatchResult<Self> {
        let resolver = ProviderResolver::with_factory(settings, factory)?;
        Ok(Self::assemble(settings, resolver, live_inputs, sink))
    }

    fn assemble(
        settings: &RelaySettings,
        resolver: ProviderResolver,
        live_inputs: Arc<LiveInputRegistry>,
        sink: Arc<dyn UsageSink>,
    ) -> Self {
        let executor = RetryExecutor::new(
            Arc::new(resolver),
            Arc::clone(&live_inputs),
            settings.retry.backoff(),
        );
        Self {
            executor,
            live_inputs,
            sink,
            default_retries: settings.retry.default_max_retries,
            error_policy: settings.stream.error_policy,
            request_timeout_ms: settings.stream.request_timeout_ms,
        }
    }

    /// The cancellation gate this client consults.
    pub fn live_inputs(&self) -> &Arc<LiveInputRegistry> {
        &self.live_inputs
    }

    /// Stream canonical events from the first config that opens.
    #[instrument(skip_all, fields(request_id = %request.context.request_id))]
    pub async fn stream_events(
        &self,
        request: CallRequest,
    ) -> DispatchResult<CallOutcome<NormalizedStream>> {
        let plan = AttemptPlan::normalize(request.models.clone(), self.default_retries)?;
        let budget = self.attempt_budget(&request.options);
        debug!(configs = plan.len(), streaming = true, "dispatching call");
        metrics::counter!("relay_calls_total", "mode" => "stream").increment(1);

        self.executor
            .run(&plan, &request.context, |attempt| {
                let prepared = self.prepare(&request, attempt);
                async move {
                    let PreparedAttempt { attempt, model_request, meta } = prepared?;
                    let family = attempt.resolved.family;
                    let opened = within(budget, attempt.resolved.adapter.open(&model_request))
                        .await
                        .unwrap_or_else(|after_ms| Err(ProviderError::Timeout { after_ms }));
                    let raw = opened.map_err(|e| DispatchError::provider(family, &attempt.model, e))?;
                    Ok(normalize_stream(raw, meta, self.error_policy, Arc::clone(&self.sink)))
                }
            })
            .await
    }

    /// Stream response text only.
    pub async fn stream_text(&self, request: CallRequest) -> DispatchResult<CallOutcome<TextStream>> {
        Ok(self
            .stream_events(request)
            .await?
            .map(NormalizedStream::into_text))
    }

    /// Run the call to completion and return the whole response.
    #[instrument(skip_all, fields(request_id = %request.context.request_id))]
    pub async fn complete(&self, request: CallRequest) -> DispatchResult<CallOutcome<Completion>> {
        let plan = AttemptPlan::normalize(request.models.clone(), self.default_retries)?;
        let budget = self.attempt_budget(&request.options);
        debug!(configs = plan.len(), streaming = false, "dispatching call");
        metrics::counter!("relay_calls_total", "mode" => "complete").increment(1);

        self.executor
            .run(&plan, &request.context, |attempt| {
                let prepared = self.prepare(&request, attempt);
                async move {
                    let PreparedAttempt { attempt, model_request, meta } = prepared?;
                    let family = attempt.resolved.family;
                    let model = attempt.model.clone();
                    let drained = async {
                        let raw = attempt
                            .resolved
                            .adapter
                            .open(&model_request)
                            .await
                            .map_err(|e| DispatchError::provider(family, &attempt.model, e))?;
                        let stream =
                            normalize_stream(raw, meta, self.error_policy, Arc::clone(&self.sink));
                        drain(stream).await
                    };
                    within(budget, drained).await.unwrap_or_else(|after_ms| {
                        Err(DispatchError::provider(
                            family,
                            model,
                            ProviderError::Timeout { after_ms },
                        ))
                    })
                }
            })
            .await
    }

    fn attempt_budget(&self, options: &RequestOptions) -> Option<Duration> {
        options
            .timeout_ms
            .or(self.request_timeout_ms)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    fn prepare(&self, request: &CallRequest, attempt: Attempt) -> DispatchResult<PreparedAttempt> {
        let model_request = ModelRequest {
            model: attempt.resolved.wire_model.clone(),
            messages: request.messages.clone(),
            options: request.options.clone(),
        };
        let request_json = serde_json::to_string(&model_request).map_err(|e| {
            DispatchError::provider(attempt.resolved.family, &attempt.model, ProviderError::Json(e))
        })?;
        let meta = StreamMeta {
            provider: attempt.resolved.family,
            model: attempt.model.clone(),
            request_json,
            context: request.context.clone(),
            started_at: Instant::now(),
        };
        Ok(PreparedAttempt {
            attempt,
            model_request,
            meta,
        })
    }
}

struct PreparedAttempt {
    attempt: Attempt,
    model_request: ModelRequest,
    meta: StreamMeta,
}

/// Run `fut` under an optional budget; `Err` carries the budget in ms.
async fn within<F: Future>(budget: Option<Duration>, fut: F) -> Result<F::Output, u64> {
    match budget {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)),
        None => Ok(fut.await),
    }
}

async fn drain(mut stream: NormalizedStream) -> DispatchResult<Completion> {
    let mut completion = Completion::default();
    while let Some(event) = stream.next().await {
        match event? {
            CanonicalEvent::TextDelta { text } => completion.text.push_str(&text),
            CanonicalEvent::ReasoningDelta { text } => completion.reasoning.push_str(&text),
            CanonicalEvent::ErrorFrame { .. } => {}
        }
    }
    completion.usage = stream.usage().unwrap_or_default();
    Ok(completion)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
