//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file
//! format. Each type implements [`Default`] with production values, and
//! `#[serde(default)]` lets a file specify only the fields it changes.

mod providers;
mod stream;

pub use providers::*;
pub use stream::*;

use std::collections::BTreeMap;

use relay_core::retry::{BackoffPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_DELAY_MS};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the relay engine.
///
/// ```json
/// {
///   "retry": { "defaultMaxRetries": 1 },
///   "stream": { "errorPolicy": "tolerate" },
///   "providers": { "openrouter": { "appTitle": "my-agent" } }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Retry and backoff policy.
    pub retry: RetrySettings,
    /// Stream handling.
    pub stream: StreamSettings,
    /// Live-input (cancellation) gate.
    pub live_input: LiveInputSettings,
    /// Provider credentials and endpoints.
    pub providers: ProviderSettings,
    /// Additional model registrations.
    pub models: ModelSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(SettingsError::InvalidValue(format!(
                "retry.maxDelayMs ({}) is below retry.baseDelayMs ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }
        if self.stream.request_timeout_ms == Some(0) {
            return Err(SettingsError::InvalidValue(
                "stream.requestTimeoutMs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retry configuration for provider calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Retries applied to a config that does not specify its own.
    pub default_max_retries: u32,
    /// Delay before the first retry in ms.
    pub base_delay_ms: u64,
    /// Cap on any single retry delay in ms.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            default_max_retries: 0,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetrySettings {
    /// Backoff policy derived from these settings.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.base_delay_ms, self.max_delay_ms)
    }
}

/// Additional model registrations beyond the built-in registry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    /// Model id → provider family (`anthropic`, `openai`, `openrouter`, `google`).
    pub extra: BTreeMap<String, String>,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
