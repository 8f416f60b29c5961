//! Scripted adapter, factory and usage sink for tests without network access.
//!
//! [`MockAdapter`] keeps one response queue per wire model id, so a fallback
//! plan can script each model independently. Every `open` is logged with the
//! (tokio) time it happened, which lets paused-clock tests assert backoff.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use relay_core::events::CanonicalEvent;

use crate::provider::{
    ModelRequest, ProviderAdapter, ProviderError, ProviderFamily, ProviderResult, RawStream,
    StreamChunk,
};
use crate::resolver::AdapterFactory;
use crate::usage::{UsageRecord, UsageSink, UsageSinkError};

/// One scripted reply to [`ProviderAdapter::open`].
#[derive(Debug)]
pub enum MockResponse {
    /// Open succeeds and yields these chunks.
    Stream(Vec<StreamChunk>),
    /// Open succeeds, yields the chunks, then fails mid-stream.
    StreamThenError(Vec<StreamChunk>, ProviderError),
    /// Open fails.
    Error(ProviderError),
    /// Wait, then behave like the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// A stream of one text event per fragment.
    pub fn text(fragments: &[&str]) -> Self {
        Self::Stream(
            fragments
                .iter()
                .map(|f| StreamChunk::Event(CanonicalEvent::text(*f)))
                .collect(),
        )
    }

    /// Wrap any response with a delay before `open` returns.
    pub fn delayed(delay: Duration, inner: Self) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// One recorded `open`.
#[derive(Clone, Debug)]
pub struct MockCall {
    /// Family the adapter was built for.
    pub family: ProviderFamily,
    /// The request as the adapter received it.
    pub request: ModelRequest,
    /// When `open` was entered.
    pub at: tokio::time::Instant,
}

#[derive(Debug, Default)]
struct MockState {
    responses: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    calls: Mutex<Vec<MockCall>>,
}

/// Adapter that replays scripted responses per wire model id.
///
/// Clones share the same script and call log.
#[derive(Clone, Debug)]
pub struct MockAdapter {
    family: ProviderFamily,
    state: Arc<MockState>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    /// Empty script.
    pub fn new() -> Self {
        Self {
            family: ProviderFamily::OpenAi,
            state: Arc::default(),
        }
    }

    /// A view of the same script reporting `family`.
    pub fn for_family(&self, family: ProviderFamily) -> Self {
        Self {
            family,
            state: Arc::clone(&self.state),
        }
    }

    /// Queue a response for `model`.
    pub fn push(&self, model: &str, response: MockResponse) -> &Self {
        self.state
            .responses
            .lock()
            .entry(model.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Every `open` so far, oldest first.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.calls.lock().clone()
    }

    /// Wire model ids in call order.
    pub fn called_models(&self) -> Vec<String> {
        self.state
            .calls
            .lock()
            .iter()
            .map(|c| c.request.model.clone())
            .collect()
    }

    /// Number of `open` calls.
    pub fn call_count(&self) -> usize {
        self.state.calls.lock().len()
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn family(&self) -> ProviderFamily {
        self.family
    }

    async fn open(&self, request: &ModelRequest) -> ProviderResult<RawStream> {
        self.state.calls.lock().push(MockCall {
            family: self.family,
            request: request.clone(),
            at: tokio::time::Instant::now(),
        });

        let next = self
            .state
            .responses
            .lock()
            .get_mut(&request.model)
            .and_then(VecDeque::pop_front);
        let Some(mut response) = next else {
            return Err(ProviderError::Other {
                message: format!("mock: no response queued for {}", request.model),
            });
        };

        loop {
            match response {
                MockResponse::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
                MockResponse::Stream(chunks) => {
                    return Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))));
                }
                MockResponse::StreamThenError(chunks, err) => {
                    let items = chunks
                        .into_iter()
                        .map(Ok)
                        .chain(std::iter::once(Err(err)));
                    return Ok(Box::pin(stream::iter(items)));
                }
                MockResponse::Error(err) => return Err(err),
            }
        }
    }
}

/// Factory that hands out views of one shared [`MockAdapter`].
#[derive(Debug, Default)]
pub struct MockFactory {
    adapter: MockAdapter,
    builds: AtomicUsize,
}

impl MockFactory {
    /// Factory over an existing script.
    pub fn new(adapter: MockAdapter) -> Self {
        Self {
            adapter,
            builds: AtomicUsize::new(0),
        }
    }

    /// The shared script.
    pub fn adapter(&self) -> &MockAdapter {
        &self.adapter
    }

    /// Number of adapters built so far.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}

impl AdapterFactory for MockFactory {
    fn build(
        &self,
        family: ProviderFamily,
        _scope: Option<&str>,
    ) -> ProviderResult<Arc<dyn ProviderAdapter>> {
        let _ = self.builds.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(self.adapter.for_family(family)))
    }
}

/// Usage sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct RecordingUsageSink {
    records: Mutex<Vec<UsageRecord>>,
    fail: bool,
}

impl RecordingUsageSink {
    /// A sink that records, then reports failure.
    pub fn failing() -> Self {
        Self {
            records: Mutex::default(),
            fail: true,
        }
    }

    /// Records received so far.
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl UsageSink for RecordingUsageSink {
    async fn record(&self, record: UsageRecord) -> Result<(), UsageSinkError> {
        self.records.lock().push(record);
        if self.fail {
            Err(UsageSinkError::new("recording sink configured to fail"))
        } else {
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn request(model: &str) -> ModelRequest {
        ModelRequest {
            model: model.into(),
            messages: Vec::new(),
            options: crate::provider::RequestOptions::default(),
        }
    }

    #[tokio::test]
    async fn responses_replay_per_model_in_order() {
        let mock = MockAdapter::new();
        let _ = mock
            .push("a", MockResponse::text(&["one"]))
            .push("a", MockResponse::Error(ProviderError::Timeout { after_ms: 5 }))
            .push("b", MockResponse::text(&["two"]));

        let first: Vec<_> = mock.open(&request("a")).await.unwrap().collect().await;
        assert_eq!(first.len(), 1);
        assert!(mock.open(&request("a")).await.is_err());
        assert!(mock.open(&request("b")).await.is_ok());
        assert_eq!(mock.called_models(), vec!["a", "a", "b"]);
    }

    #[tokio::test]
    async fn unscripted_model_fails() {
        let mock = MockAdapter::new();
        let err = mock.open(&request("x")).await.err().unwrap();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn stream_then_error_ends_with_err() {
        let mock = MockAdapter::new();
        let _ = mock.push(
            "a",
            MockResponse::StreamThenError(
                vec![StreamChunk::Event(CanonicalEvent::text("x"))],
                ProviderError::Connection {
                    message: "reset".into(),
                },
            ),
        );
        let items: Vec<_> = mock.open(&request("a")).await.unwrap().collect().await;
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_uses_tokio_clock() {
        let mock = MockAdapter::new();
        let _ = mock.push(
            "a",
            MockResponse::delayed(Duration::from_secs(5), MockResponse::text(&["late"])),
        );
        let start = tokio::time::Instant::now();
        let _ = mock.open(&request("a")).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn factory_views_share_script() {
        let factory = MockFactory::default();
        let adapter = factory.build(ProviderFamily::Google, None).unwrap();
        assert_eq!(adapter.family(), ProviderFamily::Google);
        assert_eq!(factory.builds(), 1);
    }
}
