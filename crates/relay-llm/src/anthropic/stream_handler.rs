//! Anthropic SSE stream handler.
//!
//! Converts raw Anthropic SSE events into [`StreamChunk`]s. Prompt usage
//! arrives in `message_start` and output usage in `message_delta`; the
//! handler merges both into one snapshot and reports it on each update so
//! the normalizer's last-report-wins rule sees the complete picture.

use relay_core::events::CanonicalEvent;
use tracing::debug;

use super::types::{AnthropicSseEvent, SseDelta, SseUsage};
use crate::provider::StreamChunk;
use crate::usage::ProviderUsage;

/// Usage accumulated across SSE events.
#[derive(Clone, Debug, Default)]
pub struct StreamState {
    /// Non-cached input tokens from `message_start`.
    pub input_tokens: u64,
    /// Output tokens, updated by `message_delta`.
    pub output_tokens: u64,
    /// Cache read tokens.
    pub cache_read_tokens: u64,
    /// Cache creation tokens.
    pub cache_creation_tokens: u64,
}

impl StreamState {
    fn merge(&mut self, usage: &SseUsage) {
        if let Some(v) = usage.input_tokens {
            self.input_tokens = v;
        }
        if let Some(v) = usage.output_tokens {
            self.output_tokens = v;
        }
        if let Some(v) = usage.cache_read_input_tokens {
            self.cache_read_tokens = v;
        }
        if let Some(v) = usage.cache_creation_input_tokens {
            self.cache_creation_tokens = v;
        }
    }

    fn snapshot(&self) -> StreamChunk {
        StreamChunk::Usage(ProviderUsage::Anthropic {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cache_read_tokens: self.cache_read_tokens,
            cache_creation_tokens: self.cache_creation_tokens,
        })
    }
}

/// Process a single Anthropic SSE event.
pub fn process_sse_event(event: &AnthropicSseEvent, state: &mut StreamState) -> Vec<StreamChunk> {
    match event {
        AnthropicSseEvent::MessageStart { message } => {
            state.merge(&message.usage);
            debug!(
                input_tokens = state.input_tokens,
                cache_read = state.cache_read_tokens,
                cache_write = state.cache_creation_tokens,
                "anthropic message_start"
            );
            vec![state.snapshot()]
        }
        AnthropicSseEvent::ContentBlockDelta { delta, .. } => match delta {
            SseDelta::TextDelta { text } => vec![StreamChunk::Event(CanonicalEvent::text(text))],
            SseDelta::ThinkingDelta { thinking } => {
                vec![StreamChunk::Event(CanonicalEvent::reasoning(thinking))]
            }
            SseDelta::Other => vec![],
        },
        AnthropicSseEvent::MessageDelta { usage } => match usage {
            Some(usage) => {
                state.merge(usage);
                vec![state.snapshot()]
            }
            None => vec![],
        },
        AnthropicSseEvent::Error { error } => {
            let cause = if error.error_type.is_empty() {
                error.message.clone()
            } else {
                format!("{}: {}", error.error_type, error.message)
            };
            vec![StreamChunk::Event(CanonicalEvent::error_frame(cause))]
        }
        AnthropicSseEvent::Other => vec![],
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str]) -> Vec<StreamChunk> {
        let mut state = StreamState::default();
        lines
            .iter()
            .flat_map(|line| {
                let event: AnthropicSseEvent = serde_json::from_str(line).unwrap();
                process_sse_event(&event, &mut state)
            })
            .collect()
    }

    #[test]
    fn text_and_thinking_deltas() {
        let chunks = run(&[
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"plan"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"sig"}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"Hello"}}"#,
        ]);
        assert_eq!(
            chunks,
            vec![
                StreamChunk::Event(CanonicalEvent::reasoning("plan")),
                StreamChunk::Event(CanonicalEvent::text("Hello")),
            ]
        );
    }

    #[test]
    fn usage_merges_start_and_delta() {
        let chunks = run(&[
            r#"{"type":"message_start","message":{"usage":{"input_tokens":604,"output_tokens":1,"cache_read_input_tokens":8266,"cache_creation_input_tokens":0}}}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":100}}"#,
        ]);
        assert_eq!(
            chunks.last(),
            Some(&StreamChunk::Usage(ProviderUsage::Anthropic {
                input_tokens: 604,
                output_tokens: 100,
                cache_read_tokens: 8266,
                cache_creation_tokens: 0,
            }))
        );
    }

    #[test]
    fn error_event_becomes_error_frame() {
        let chunks = run(&[
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        ]);
        assert_eq!(
            chunks,
            vec![StreamChunk::Event(CanonicalEvent::error_frame(
                "overloaded_error: Overloaded"
            ))]
        );
    }

    #[test]
    fn ping_and_stop_events_are_silent() {
        let chunks = run(&[
            r#"{"type":"ping"}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"message_stop"}"#,
        ]);
        assert!(chunks.is_empty());
    }
}
