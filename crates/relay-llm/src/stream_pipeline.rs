//! Stream pipeline helpers shared by the HTTP adapters.
//!
//! All three adapters follow the same pattern: send the request, map a
//! non-2xx status to a [`ProviderError`], then parse SSE lines → deserialize
//! JSON → run a per-provider state machine → flatten → box. These helpers
//! hold that boilerplate so each adapter only supplies its wire types and
//! handler.

use futures::stream::{self, StreamExt};
use tracing::warn;

use crate::error_parsing::error_from_response;
use crate::provider::{ProviderError, ProviderFamily, ProviderResult, RawStream, StreamChunk};
use crate::sse::{SseParserOptions, parse_sse_lines};

/// Send a streaming request and fail fast on a non-2xx status.
pub async fn send_checked(
    provider: ProviderFamily,
    request: reqwest::RequestBuilder,
) -> ProviderResult<reqwest::Response> {
    let response = request.send().await.map_err(ProviderError::Http)?;
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(error_from_response(provider, response).await)
    }
}

/// Convert an HTTP response's SSE body into a [`RawStream`].
///
/// Lines that fail to deserialize as `E` are logged and skipped. A body read
/// error is forwarded as the final item.
pub fn sse_to_chunk_stream<E, S, H>(
    provider: ProviderFamily,
    response: reqwest::Response,
    options: &SseParserOptions,
    initial_state: S,
    mut handler: H,
) -> RawStream
where
    E: serde::de::DeserializeOwned + Send + 'static,
    S: Send + 'static,
    H: FnMut(&E, &mut S) -> Vec<StreamChunk> + Send + 'static,
{
    let lines = parse_sse_lines(response.bytes_stream(), options);

    let chunks = lines
        .scan(initial_state, move |state, line| {
            let items: Vec<ProviderResult<StreamChunk>> = match line {
                Ok(line) => match serde_json::from_str::<E>(&line) {
                    Ok(event) => handler(&event, state).into_iter().map(Ok).collect(),
                    Err(e) => {
                        warn!(
                            provider = %provider,
                            error = %e,
                            data_preview = relay_core::text::truncate_str(&line, 100),
                            "failed to parse SSE event"
                        );
                        Vec::new()
                    }
                },
                Err(e) => vec![Err(e)],
            };
            std::future::ready(Some(items))
        })
        .flat_map(stream::iter);

    Box::pin(chunks)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
