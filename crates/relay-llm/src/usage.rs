//! Usage unification and the cost sink boundary.
//!
//! Adapters report usage in their provider's native shape as a
//! [`ProviderUsage`]. [`ProviderUsage::summarize`] converts every shape to
//! the disjoint-bucket [`UsageSummary`]:
//!
//! - **Anthropic** reports `input_tokens` with cache reads and writes already
//!   excluded, so the buckets map one-to-one.
//! - **`OpenAI` / `OpenRouter`** report `prompt_tokens` *including* the cached
//!   subset in `prompt_tokens_details.cached_tokens`; `OpenRouter` may also
//!   report a direct monetary `cost`.
//! - **Gemini** reports `promptTokenCount` *including*
//!   `cachedContentTokenCount`, and counts reasoning separately in
//!   `thoughtsTokenCount`.
//!
//! The normalizer hands a [`UsageRecord`] to the [`UsageSink`] once per
//! completed stream. Sink failures are logged by the caller and never
//! propagated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::ids::{AttributionId, MessageId, RequestId, SessionId, UserId};
use relay_core::usage::UsageSummary;
use serde::{Deserialize, Serialize};

use crate::provider::ProviderFamily;

// ─────────────────────────────────────────────────────────────────────────────
// Provider usage shapes
// ─────────────────────────────────────────────────────────────────────────────

/// Usage exactly as a provider family reports it.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderUsage {
    /// Disjoint buckets.
    Anthropic {
        /// Non-cached input tokens.
        input_tokens: u64,
        /// Output tokens.
        output_tokens: u64,
        /// Tokens read from cache.
        cache_read_tokens: u64,
        /// Tokens written to cache.
        cache_creation_tokens: u64,
    },
    /// Inclusive prompt count with a cached subset and optional cost.
    OpenAi {
        /// Total prompt tokens, cached included.
        prompt_tokens: u64,
        /// Completion tokens.
        completion_tokens: u64,
        /// Cached subset of `prompt_tokens`.
        cached_tokens: u64,
        /// Provider-reported cost in USD.
        cost: Option<f64>,
    },
    /// Inclusive prompt count with a cached subset and separate reasoning count.
    Google {
        /// Total prompt tokens, cached included.
        prompt_tokens: u64,
        /// Candidate (visible output) tokens.
        candidates_tokens: u64,
        /// Cached subset of `prompt_tokens`.
        cached_tokens: u64,
        /// Reasoning tokens.
        thoughts_tokens: u64,
    },
}

impl ProviderUsage {
    /// Convert to the unified summary without double-counting cache tokens.
    pub fn summarize(&self) -> UsageSummary {
        match *self {
            Self::Anthropic {
                input_tokens,
                output_tokens,
                cache_read_tokens,
                cache_creation_tokens,
            } => UsageSummary::from_disjoint(
                input_tokens,
                output_tokens,
                cache_read_tokens,
                cache_creation_tokens,
            ),
            Self::OpenAi {
                prompt_tokens,
                completion_tokens,
                cached_tokens,
                cost,
            } => UsageSummary::from_inclusive(prompt_tokens, cached_tokens, completion_tokens)
                .with_cost(cost),
            Self::Google {
                prompt_tokens,
                candidates_tokens,
                cached_tokens,
                thoughts_tokens,
            } => UsageSummary::from_inclusive(
                prompt_tokens,
                cached_tokens,
                candidates_tokens + thoughts_tokens,
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sink boundary
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the cost-accounting collaborator receives for one completed call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Id minted for this response.
    pub message_id: MessageId,
    /// End user, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Client session.
    pub session_id: SessionId,
    /// Request that produced the response.
    pub request_id: RequestId,
    /// Attribution scope sent to the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution_id: Option<AttributionId>,
    /// Model id as configured in the attempt plan.
    pub model: String,
    /// Provider family that served the response.
    pub provider: ProviderFamily,
    /// Serialized request.
    pub request_json: String,
    /// Concatenated response text.
    pub response_text: String,
    /// Unified token counts.
    pub usage: UsageSummary,
    /// Duration of the successful attempt only.
    pub latency_ms: u64,
    /// When the stream ended.
    pub finished_at: DateTime<Utc>,
}

/// Error returned by a [`UsageSink`].
#[derive(Debug, thiserror::Error)]
#[error("usage sink failed: {message}")]
pub struct UsageSinkError {
    /// Failure description.
    pub message: String,
}

impl UsageSinkError {
    /// Create an error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// External cost-accounting collaborator.
#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Record one completed call.
    async fn record(&self, record: UsageRecord) -> Result<(), UsageSinkError>;
}

/// Sink that discards every record.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: UsageRecord) -> Result<(), UsageSinkError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_buckets_pass_through() {
        let usage = ProviderUsage::Anthropic {
            input_tokens: 604,
            output_tokens: 100,
            cache_read_tokens: 8_266,
            cache_creation_tokens: 0,
        }
        .summarize();
        assert_eq!(usage.input_tokens, 604);
        assert_eq!(usage.cache_read_tokens, 8_266);
        assert_eq!(usage.output_tokens, 100);
        assert!(usage.cost_override.is_none());
    }

    #[test]
    fn openai_cached_subset_not_double_counted() {
        let usage = ProviderUsage::OpenAi {
            prompt_tokens: 10_000,
            completion_tokens: 250,
            cached_tokens: 8_000,
            cost: Some(0.0042),
        }
        .summarize();
        assert_eq!(usage.input_tokens, 2_000);
        assert_eq!(usage.cache_read_tokens, 8_000);
        assert_eq!(usage.output_tokens, 250);
        assert_eq!(usage.cost_override, Some(0.0042));
    }

    #[test]
    fn google_thoughts_count_as_output() {
        let usage = ProviderUsage::Google {
            prompt_tokens: 1_000,
            candidates_tokens: 40,
            cached_tokens: 600,
            thoughts_tokens: 60,
        }
        .summarize();
        assert_eq!(usage.input_tokens, 400);
        assert_eq!(usage.cache_read_tokens, 600);
        assert_eq!(usage.output_tokens, 100);
    }

    #[tokio::test]
    async fn noop_sink_accepts_records() {
        let record = UsageRecord {
            message_id: MessageId::new(),
            user_id: None,
            session_id: SessionId::from_raw("s"),
            request_id: RequestId::from_raw("r"),
            attribution_id: None,
            model: "m".into(),
            provider: ProviderFamily::Anthropic,
            request_json: "{}".into(),
            response_text: String::new(),
            usage: UsageSummary::default(),
            latency_ms: 0,
            finished_at: Utc::now(),
        };
        assert!(NoopUsageSink.record(record).await.is_ok());
    }
}
