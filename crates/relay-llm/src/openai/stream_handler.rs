//! OpenAI-compatible chunk handler.
//!
//! Each chunk may carry text, reasoning, a usage report, or an error; a
//! single chunk can produce several [`StreamChunk`]s. The handler is
//! stateless.

use relay_core::events::CanonicalEvent;

use super::types::ChatChunk;
use crate::provider::StreamChunk;
use crate::usage::ProviderUsage;

/// Process one chat completion chunk.
pub fn process_chunk(chunk: &ChatChunk, _state: &mut ()) -> Vec<StreamChunk> {
    let mut out = Vec::new();

    if let Some(error) = &chunk.error {
        let cause = match &error.code {
            Some(code) => format!("{code}: {}", error.message),
            None => error.message.clone(),
        };
        out.push(StreamChunk::Event(CanonicalEvent::error_frame(cause)));
    }

    for choice in &chunk.choices {
        let delta = &choice.delta;
        let reasoning = delta
            .reasoning
            .as_deref()
            .or(delta.reasoning_content.as_deref())
            .filter(|s| !s.is_empty());
        if let Some(reasoning) = reasoning {
            out.push(StreamChunk::Event(CanonicalEvent::reasoning(reasoning)));
        }
        if let Some(text) = delta.content.as_deref().filter(|s| !s.is_empty()) {
            out.push(StreamChunk::Event(CanonicalEvent::text(text)));
        }
    }

    if let Some(usage) = &chunk.usage {
        out.push(StreamChunk::Usage(ProviderUsage::OpenAi {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cached_tokens: usage
                .prompt_tokens_details
                .as_ref()
                .map_or(0, |d| d.cached_tokens),
            cost: usage.cost,
        }));
    }

    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
