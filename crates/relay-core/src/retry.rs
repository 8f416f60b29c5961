//! Backoff calculation.
//!
//! The portable, sync-only building blocks of the retry policy. The async
//! retry loop lives in `relay-llm`, which owns the tokio timer:
//!
//! - [`BackoffPolicy`]: base and cap for exponential backoff
//! - [`calculate_backoff_delay`]: `min(cap, base * 2^attempt)`
//! - [`parse_retry_after_header`]: parse a `Retry-After` HTTP header

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Exponential backoff parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    /// Delay before the first retry in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on any single delay in ms (default: 10000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy from base and cap.
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    ///
    /// A server-provided `Retry-After` hint can only lengthen the wait; the
    /// result never exceeds `max_delay_ms`.
    pub fn delay(&self, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
        let computed = calculate_backoff_delay(attempt, self.base_delay_ms, self.max_delay_ms);
        let ms = retry_after_ms
            .map_or(computed, |hint| computed.max(hint))
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Calculate exponential backoff delay.
///
/// Formula: `min(max_delay, base_delay * 2^attempt)`
///
/// * `attempt`: zero-based retry index (0 for first retry)
#[must_use]
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    base_delay_ms
        .saturating_mul(1u64 << attempt.min(31))
        .min(max_delay_ms)
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry-After header parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a `Retry-After` HTTP header value.
///
/// Accepts either delta-seconds (`"120"`) or an HTTP-date
/// (`"Thu, 01 Dec 2025 16:00:00 GMT"`). Returns milliseconds, or `None`
/// if the value is neither.
#[must_use]
pub fn parse_retry_after_header(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delay_ms = date
        .signed_duration_since(chrono::Utc::now())
        .num_milliseconds();
    Some(u64::try_from(delay_ms).unwrap_or(0))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
