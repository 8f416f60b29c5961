//! Stream handling and live-input gate settings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What to do when a provider reports an error frame inside a stream.
///
/// Error frames are always logged. Under [`Raise`](Self::Raise) the call then
/// fails after any text already delivered; under
/// [`Tolerate`](Self::Tolerate) the stream continues best-effort.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamErrorPolicy {
    /// Fail the call on the first error frame.
    #[default]
    Raise,
    /// Log the error frame and keep streaming.
    Tolerate,
}

impl fmt::Display for StreamErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raise => "raise",
            Self::Tolerate => "tolerate",
        })
    }
}

impl FromStr for StreamErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raise" => Ok(Self::Raise),
            "tolerate" => Ok(Self::Tolerate),
            other => Err(format!("unknown stream error policy: {other}")),
        }
    }
}

/// Stream handling settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    /// Provider error frame handling.
    pub error_policy: StreamErrorPolicy,
    /// Default per-attempt timeout in ms. `None` means no timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

/// Live-input gate settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveInputSettings {
    /// When false every request is treated as live (test and bench mode).
    pub check_enabled: bool,
}

impl Default for LiveInputSettings {
    fn default() -> Self {
        Self {
            check_enabled: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Tolerate".parse(), Ok(StreamErrorPolicy::Tolerate));
        assert_eq!(" raise ".parse(), Ok(StreamErrorPolicy::Raise));
        assert!("ignore".parse::<StreamErrorPolicy>().is_err());
    }

    #[test]
    fn policy_serde_lowercase() {
        let policy: StreamErrorPolicy = serde_json::from_str("\"tolerate\"").unwrap();
        assert_eq!(policy, StreamErrorPolicy::Tolerate);
        assert_eq!(policy.to_string(), "tolerate");
    }

    #[test]
    fn timeout_omitted_when_unset() {
        let json = serde_json::to_value(StreamSettings::default()).unwrap();
        assert!(json.get("requestTimeoutMs").is_none());
    }
}
