//! Unified token usage.
//!
//! Providers disagree on what "input tokens" means. Anthropic reports new,
//! cache-read and cache-creation tokens as three disjoint buckets, while
//! `OpenAI`-style and Gemini responses report the full prompt and a cached
//! subset of it. [`UsageSummary`] always uses the disjoint form:
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `input_tokens` | prompt tokens billed at the base rate (cache reads excluded) |
//! | `cache_read_tokens` | prompt tokens served from cache |
//! | `cache_creation_tokens` | prompt tokens written to cache |
//! | `output_tokens` | generated tokens, reasoning included |

use serde::{Deserialize, Serialize};

/// Finalized token counts for one provider response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    /// Non-cached prompt tokens.
    pub input_tokens: u64,
    /// Generated tokens.
    pub output_tokens: u64,
    /// Prompt tokens read from cache.
    pub cache_read_tokens: u64,
    /// Prompt tokens written to cache.
    pub cache_creation_tokens: u64,
    /// Provider-reported monetary cost (USD). Authoritative over token pricing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_override: Option<f64>,
}

impl UsageSummary {
    /// Build a summary from disjoint buckets (Anthropic shape).
    pub fn from_disjoint(input: u64, output: u64, cache_read: u64, cache_creation: u64) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
            cache_read_tokens: cache_read,
            cache_creation_tokens: cache_creation,
            cost_override: None,
        }
    }

    /// Build a summary from a total prompt count that includes a cached subset.
    ///
    /// The cached subset is moved out of `input_tokens`; a cached count larger
    /// than the total is clamped to the total.
    pub fn from_inclusive(prompt_total: u64, cached: u64, output: u64) -> Self {
        let cached = cached.min(prompt_total);
        Self {
            input_tokens: prompt_total - cached,
            output_tokens: output,
            cache_read_tokens: cached,
            cache_creation_tokens: 0,
            cost_override: None,
        }
    }

    /// Attach a provider-reported cost.
    #[must_use]
    pub fn with_cost(mut self, cost: Option<f64>) -> Self {
        self.cost_override = cost;
        self
    }

    /// Total prompt tokens across all buckets.
    pub fn total_prompt_tokens(&self) -> u64 {
        self.input_tokens + self.cache_read_tokens + self.cache_creation_tokens
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn inclusive_subtracts_cached() {
        let usage = UsageSummary::from_inclusive(10_000, 8_000, 500);
        assert_eq!(usage.input_tokens, 2_000);
        assert_eq!(usage.cache_read_tokens, 8_000);
        assert_eq!(usage.cache_creation_tokens, 0);
        assert_eq!(usage.total_prompt_tokens(), 10_000);
    }

    #[test]
    fn inclusive_clamps_oversized_cache() {
        let usage = UsageSummary::from_inclusive(100, 250, 1);
        assert_eq!(usage.input_tokens, 0);
        assert_eq!(usage.cache_read_tokens, 100);
    }

    #[test]
    fn disjoint_keeps_buckets() {
        let usage = UsageSummary::from_disjoint(604, 100, 8_266, 12);
        assert_eq!(usage.input_tokens, 604);
        assert_eq!(usage.total_prompt_tokens(), 604 + 8_266 + 12);
    }

    #[test]
    fn cost_skipped_when_absent() {
        let json = serde_json::to_value(UsageSummary::default()).unwrap();
        assert!(json.get("costOverride").is_none());
        let json = serde_json::to_value(UsageSummary::default().with_cost(Some(0.25))).unwrap();
        assert_eq!(json["costOverride"], 0.25);
    }

    proptest! {
        #[test]
        fn inclusive_never_double_counts(total in 0u64..1_000_000, cached in 0u64..1_000_000) {
            let usage = UsageSummary::from_inclusive(total, cached, 0);
            prop_assert_eq!(usage.total_prompt_tokens(), total);
        }
    }
}
