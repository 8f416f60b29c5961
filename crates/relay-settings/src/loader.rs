//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{RelaySettings, StreamErrorPolicy};

/// Env var that redirects the settings file.
pub const SETTINGS_PATH_ENV: &str = "RELAY_SETTINGS_PATH";

/// Resolve the settings file path.
///
/// `RELAY_SETTINGS_PATH` wins; otherwise `~/.relay/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(path) = read_env_string(SETTINGS_PATH_ENV) {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".relay").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Invalid values are ignored with a warning and leave the file/default
/// value in place. Empty strings count as unset.
pub fn apply_overrides_from<F>(settings: &mut RelaySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Stream / live input ─────────────────────────────────────────
    if let Some(v) = get("RELAY_STREAM_ERROR_POLICY") {
        match v.parse::<StreamErrorPolicy>() {
            Ok(policy) => settings.stream.error_policy = policy,
            Err(_) => warn!(key = "RELAY_STREAM_ERROR_POLICY", value = %v, "invalid stream error policy, ignoring"),
        }
    }
    if let Some(v) = get("RELAY_DISABLE_LIVE_INPUT_CHECK") {
        match parse_bool(&v) {
            Some(disabled) => settings.live_input.check_enabled = !disabled,
            None => warn!(key = "RELAY_DISABLE_LIVE_INPUT_CHECK", value = %v, "invalid boolean env var, ignoring"),
        }
    }

    // ── Retry ───────────────────────────────────────────────────────
    let u64_var = |name: &str, min: u64, max: u64| {
        get(name).and_then(|v| checked_u64(name, &v, min, max))
    };
    if let Some(ms) = u64_var("RELAY_RETRY_BASE_DELAY_MS", 0, 600_000) {
        settings.retry.base_delay_ms = ms;
    }
    if let Some(ms) = u64_var("RELAY_RETRY_MAX_DELAY_MS", 0, 3_600_000) {
        settings.retry.max_delay_ms = ms;
    }
    if let Some(n) = u64_var("RELAY_DEFAULT_MAX_RETRIES", 0, 100) {
        settings.retry.default_max_retries = u32::try_from(n).unwrap_or(0);
    }

    // ── Provider keys ───────────────────────────────────────────────
    if let Some(v) = get("ANTHROPIC_API_KEY") {
        settings.providers.anthropic.api_key = Some(v);
    }
    if let Some(v) = get("OPENAI_API_KEY") {
        settings.providers.openai.api_key = Some(v);
    }
    if let Some(v) = get("OPENROUTER_API_KEY") {
        settings.providers.openrouter.endpoint.api_key = Some(v);
    }
    if let Some(v) = get("GEMINI_API_KEY") {
        settings.providers.google.api_key = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = get("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn checked_u64(name: &str, val: &str, min: u64, max: u64) -> Option<u64> {
    let result = parse_u64_range(val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid integer env var, ignoring");
    }
    result
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
