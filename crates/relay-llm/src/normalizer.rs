//! # Stream Normalizer
//!
//! Wraps one adapter's [`RawStream`] and produces the caller-facing event
//! stream:
//!
//! - Canonical events pass through in arrival order.
//! - Usage reports are held back; the last one wins and is unified into a
//!   [`UsageSummary`] when the stream ends.
//! - Provider error frames are always logged. Under
//!   [`StreamErrorPolicy::Raise`] the stream ends with
//!   [`DispatchError::Stream`]; under [`StreamErrorPolicy::Tolerate`] the
//!   frame is forwarded and the stream continues.
//! - Transport errors end the stream with a wrapped [`DispatchError`].
//! - On normal completion the [`UsageSink`] is called exactly once. A sink
//!   failure is logged and never reaches the caller.
//!
//! Events already yielded are never retracted: a failure after partial
//! output still ends the stream with an error.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use chrono::Utc;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use relay_core::events::CanonicalEvent;
use relay_core::ids::{MessageId, UserId};
use relay_core::usage::UsageSummary;
use relay_settings::StreamErrorPolicy;
use tracing::{debug, error, warn};

use crate::client::CallContext;
use crate::error::{DispatchError, DispatchResult};
use crate::provider::{ProviderFamily, RawStream, StreamChunk};
use crate::usage::{ProviderUsage, UsageRecord, UsageSink};

/// Context the normalizer needs to log and to build the usage record.
#[derive(Clone, Debug)]
pub struct StreamMeta {
    /// Provider family serving the stream.
    pub provider: ProviderFamily,
    /// Model id as configured in the attempt plan.
    pub model: String,
    /// Serialized request, forwarded to the usage sink.
    pub request_json: String,
    /// Call identifiers.
    pub context: CallContext,
    /// Start of the attempt that opened this stream.
    pub started_at: tokio::time::Instant,
}

type EventStream = Pin<Box<dyn Stream<Item = DispatchResult<CanonicalEvent>> + Send>>;

pin_project_lite::pin_project! {
    /// Canonical event stream for one call.
    ///
    /// Lazy, finite and non-restartable. After it ends normally,
    /// [`NormalizedStream::usage`] returns the unified usage.
    pub struct NormalizedStream {
        #[pin]
        inner: EventStream,
        usage: Arc<Mutex<Option<UsageSummary>>>,
    }
}

impl NormalizedStream {
    /// Unified usage, available once the stream has completed normally.
    pub fn usage(&self) -> Option<UsageSummary> {
        self.usage.lock().clone()
    }

    /// Drop everything but response text.
    pub fn into_text(self) -> TextStream {
        TextStream { inner: self }
    }
}

impl Stream for NormalizedStream {
    type Item = DispatchResult<CanonicalEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

impl std::fmt::Debug for NormalizedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedStream")
            .field("usage", &self.usage())
            .finish_non_exhaustive()
    }
}

pin_project_lite::pin_project! {
    /// Text-only view of a [`NormalizedStream`].
    ///
    /// Reasoning deltas and tolerated error frames are skipped; errors still
    /// end the stream.
    #[derive(Debug)]
    pub struct TextStream {
        #[pin]
        inner: NormalizedStream,
    }
}

impl TextStream {
    /// Unified usage, available once the stream has completed normally.
    pub fn usage(&self) -> Option<UsageSummary> {
        self.inner.usage()
    }
}

impl Stream for TextStream {
    type Item = DispatchResult<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(CanonicalEvent::TextDelta { text })) => return Poll::Ready(Some(Ok(text))),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => return Poll::Ready(None),
            }
        }
    }
}

/// Normalize `raw` under `policy`, reporting usage to `sink` on completion.
pub fn normalize_stream(
    raw: RawStream,
    meta: StreamMeta,
    policy: StreamErrorPolicy,
    sink: Arc<dyn UsageSink>,
) -> NormalizedStream {
    let usage_slot = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&usage_slot);

    let inner = async_stream::stream! {
        let mut raw = raw;
        let mut latest: Option<ProviderUsage> = None;
        let mut response_text = String::new();

        while let Some(item) = raw.next().await {
            match item {
                Ok(StreamChunk::Event(event)) => {
                    match &event {
                        CanonicalEvent::TextDelta { text } => response_text.push_str(text),
                        CanonicalEvent::ReasoningDelta { .. } => {}
                        CanonicalEvent::ErrorFrame { cause } => {
                            error!(
                                provider = %meta.provider,
                                model = %meta.model,
                                request_id = %meta.context.request_id,
                                session_id = %meta.context.session_id,
                                user_id = meta.context.user_id.as_ref().map_or("-", UserId::as_str),
                                policy = %policy,
                                emitted_bytes = response_text.len(),
                                cause = %cause,
                                "provider reported error frame"
                            );
                            if policy == StreamErrorPolicy::Raise {
                                yield Err(DispatchError::Stream {
                                    provider: meta.provider,
                                    model: meta.model.clone(),
                                    message: cause.clone(),
                                    retryable: false,
                                });
                                return;
                            }
                        }
                    }
                    yield Ok(event);
                }
                Ok(StreamChunk::Usage(report)) => latest = Some(report),
                Err(err) => {
                    error!(
                        provider = %meta.provider,
                        model = %meta.model,
                        request_id = %meta.context.request_id,
                        emitted_bytes = response_text.len(),
                        error = %err,
                        "provider stream failed"
                    );
                    yield Err(DispatchError::provider(meta.provider, meta.model.clone(), err));
                    return;
                }
            }
        }

        let usage = latest.as_ref().map(ProviderUsage::summarize).unwrap_or_default();
        *slot.lock() = Some(usage.clone());
        let latency_ms = u64::try_from(meta.started_at.elapsed().as_millis()).unwrap_or(u64::MAX);

        debug!(
            provider = %meta.provider,
            model = %meta.model,
            request_id = %meta.context.request_id,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cache_read_tokens = usage.cache_read_tokens,
            cache_creation_tokens = usage.cache_creation_tokens,
            latency_ms,
            "stream completed"
        );

        let record = UsageRecord {
            message_id: MessageId::new(),
            user_id: meta.context.user_id.clone(),
            session_id: meta.context.session_id.clone(),
            request_id: meta.context.request_id.clone(),
            attribution_id: meta.context.attribution_id.clone(),
            model: meta.model.clone(),
            provider: meta.provider,
            request_json: meta.request_json.clone(),
            response_text,
            usage,
            latency_ms,
            finished_at: Utc::now(),
        };
        if let Err(e) = sink.record(record).await {
            warn!(
                provider = %meta.provider,
                model = %meta.model,
                request_id = %meta.context.request_id,
                error = %e,
                "usage sink failed, continuing"
            );
        }
    };

    NormalizedStream {
        inner: Box::pin(inner),
        usage: usage_slot,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use relay_core::ids::{RequestId, UserId};
    use relay_core::logging::capture_logs;
    use tracing::Level;

    use super::*;
    use crate::mock::RecordingUsageSink;
    use crate::provider::ProviderError;

    fn meta() -> StreamMeta {
        StreamMeta {
            provider: ProviderFamily::OpenRouter,
            model: "openrouter/x".into(),
            request_json: r#"{"model":"x"}"#.into(),
            context: CallContext {
                user_id: Some(UserId::from_raw("user_1")),
                request_id: RequestId::from_raw("req_1"),
                ..CallContext::default()
            },
            started_at: tokio::time::Instant::now(),
        }
    }

    fn raw(items: Vec<Result<StreamChunk, ProviderError>>) -> RawStream {
        Box::pin(futures::stream::iter(items))
    }

    fn text(s: &str) -> Result<StreamChunk, ProviderError> {
        Ok(StreamChunk::Event(CanonicalEvent::text(s)))
    }

    fn openai_usage(prompt: u64, cached: u64) -> Result<StreamChunk, ProviderError> {
        Ok(StreamChunk::Usage(ProviderUsage::OpenAi {
            prompt_tokens: prompt,
            completion_tokens: 5,
            cached_tokens: cached,
            cost: Some(0.01),
        }))
    }

    #[tokio::test]
    async fn events_pass_through_and_sink_called_once() {
        let sink = Arc::new(RecordingUsageSink::default());
        let mut stream = normalize_stream(
            raw(vec![
                Ok(StreamChunk::Event(CanonicalEvent::reasoning("hmm"))),
                text("Hel"),
                openai_usage(10, 0),
                text("lo"),
                openai_usage(100, 80),
            ]),
            meta(),
            StreamErrorPolicy::Raise,
            sink.clone(),
        );
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }
        assert_eq!(
            events,
            vec![
                CanonicalEvent::reasoning("hmm"),
                CanonicalEvent::text("Hel"),
                CanonicalEvent::text("lo"),
            ]
        );

        let usage = stream.usage().unwrap();
        assert_eq!(usage.input_tokens, 20);
        assert_eq!(usage.cache_read_tokens, 80);
        assert_eq!(usage.cost_override, Some(0.01));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].response_text, "Hello");
        assert_eq!(records[0].model, "openrouter/x");
        assert_eq!(records[0].usage, usage);
        assert_eq!(records[0].user_id.as_ref().map(UserId::as_str), Some("user_1"));
    }

    #[tokio::test]
    async fn raise_policy_ends_stream_on_error_frame() {
        let sink = Arc::new(RecordingUsageSink::default());
        let stream = normalize_stream(
            raw(vec![
                text("partial"),
                Ok(StreamChunk::Event(CanonicalEvent::error_frame("overloaded"))),
                text("never"),
            ]),
            meta(),
            StreamErrorPolicy::Raise,
            sink.clone(),
        );
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &CanonicalEvent::text("partial"));
        assert_matches!(
            &items[1],
            Err(DispatchError::Stream { message, retryable: false, .. }) if message == "overloaded"
        );
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn tolerate_policy_forwards_frame_and_continues() {
        let (logs, _guard) = capture_logs();
        let sink = Arc::new(RecordingUsageSink::default());
        let stream = normalize_stream(
            raw(vec![
                text("a"),
                Ok(StreamChunk::Event(CanonicalEvent::error_frame("blip"))),
                text("b"),
            ]),
            meta(),
            StreamErrorPolicy::Tolerate,
            sink.clone(),
        );
        let items: Vec<_> = stream.map(Result::unwrap).collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[1].is_error());
        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.records()[0].response_text, "ab");
        assert!(logs.has_event(Level::ERROR, "provider reported error frame"));
    }

    #[tokio::test]
    async fn transport_error_is_wrapped_with_context() {
        let sink = Arc::new(RecordingUsageSink::default());
        let stream = normalize_stream(
            raw(vec![
                text("a"),
                Err(ProviderError::Connection {
                    message: "reset".into(),
                }),
            ]),
            meta(),
            StreamErrorPolicy::Raise,
            sink.clone(),
        );
        let items: Vec<_> = stream.collect().await;
        assert_matches!(
            &items[1],
            Err(DispatchError::Provider { provider: ProviderFamily::OpenRouter, .. })
        );
        assert!(items[1].as_ref().unwrap_err().is_retryable());
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn sink_failure_does_not_reach_caller() {
        let (logs, _guard) = capture_logs();
        let sink = Arc::new(RecordingUsageSink::failing());
        let stream = normalize_stream(raw(vec![text("ok")]), meta(), StreamErrorPolicy::Raise, sink.clone());
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
        assert_eq!(sink.records().len(), 1);
        assert!(logs.has_event(Level::WARN, "usage sink failed"));
    }

    #[tokio::test]
    async fn missing_usage_reports_zero() {
        let sink = Arc::new(RecordingUsageSink::default());
        let mut stream = normalize_stream(raw(vec![text("x")]), meta(), StreamErrorPolicy::Raise, sink.clone());
        while stream.next().await.is_some() {}
        assert_eq!(stream.usage(), Some(UsageSummary::default()));
    }

    #[tokio::test(start_paused = true)]
    async fn latency_measured_from_attempt_start() {
        let sink = Arc::new(RecordingUsageSink::default());
        let started_at = tokio::time::Instant::now();
        tokio::time::advance(Duration::from_millis(250)).await;
        let stream = normalize_stream(
            raw(vec![text("x")]),
            StreamMeta { started_at, ..meta() },
            StreamErrorPolicy::Raise,
            sink.clone(),
        );
        let _: Vec<_> = stream.collect().await;
        assert_eq!(sink.records()[0].latency_ms, 250);
    }

    #[tokio::test]
    async fn text_stream_skips_reasoning() {
        let sink = Arc::new(RecordingUsageSink::default());
        let mut stream = normalize_stream(
            raw(vec![
                Ok(StreamChunk::Event(CanonicalEvent::reasoning("think"))),
                text("a"),
                text("b"),
                openai_usage(3, 0),
            ]),
            meta(),
            StreamErrorPolicy::Raise,
            sink,
        )
        .into_text();
        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
            out.push_str(&chunk.unwrap());
        }
        assert_eq!(out, "ab");
        assert_eq!(stream.usage().map(|u| u.input_tokens), Some(3));
    }
}
