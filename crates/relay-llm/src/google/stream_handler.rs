//! Gemini chunk handler.
//!
//! Gemini repeats cumulative `usageMetadata` on every chunk; each one is
//! forwarded and the normalizer keeps the last.

use relay_core::events::CanonicalEvent;

use super::types::GeminiStreamChunk;
use crate::provider::StreamChunk;
use crate::usage::ProviderUsage;

/// Process one streamed `GenerateContentResponse`.
pub fn process_chunk(chunk: &GeminiStreamChunk, _state: &mut ()) -> Vec<StreamChunk> {
    let mut out = Vec::new();

    if let Some(error) = &chunk.error {
        let cause = match &error.status {
            Some(status) => format!("{status} ({}): {}", error.code, error.message),
            None => format!("{}: {}", error.code, error.message),
        };
        out.push(StreamChunk::Event(CanonicalEvent::error_frame(cause)));
    }

    let parts = chunk
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|c| c.parts.as_slice())
        .unwrap_or_default();
    for part in parts {
        let Some(text) = part.text.as_deref().filter(|t| !t.is_empty()) else {
            continue;
        };
        let event = if part.thought {
            CanonicalEvent::reasoning(text)
        } else {
            CanonicalEvent::text(text)
        };
        out.push(StreamChunk::Event(event));
    }

    if let Some(usage) = &chunk.usage_metadata {
        out.push(StreamChunk::Usage(ProviderUsage::Google {
            prompt_tokens: usage.prompt_token_count,
            candidates_tokens: usage.candidates_token_count,
            cached_tokens: usage.cached_content_token_count,
            thoughts_tokens: usage.thoughts_token_count,
        }));
    }

    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
