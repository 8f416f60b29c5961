//! # Model Registry
//!
//! Maps a logical model id to the provider family that serves it and the
//! model name to put on the wire.
//!
//! Lookup order:
//! 1. Explicit prefix `family/model`. `anthropic/`, `openai/` and `google/`
//!    only accept models that family is known to serve; `openrouter/`
//!    accepts any non-empty model, since `OpenRouter` routes by its own
//!    `vendor/model` names.
//! 2. Extra registrations from settings (exact match).
//! 3. Built-in model tables (exact match).
//!
//! Anything else is unknown; the resolver turns that into a configuration
//! error that is never retried.

use std::collections::HashMap;

use relay_settings::ModelSettings;

use crate::provider::ProviderFamily;

// ─────────────────────────────────────────────────────────────────────────────
// Built-in tables
// ─────────────────────────────────────────────────────────────────────────────

/// Anthropic model ids.
pub const ANTHROPIC_MODELS: &[&str] = &[
    "claude-opus-4-6",
    "claude-opus-4-5-20251101",
    "claude-sonnet-4-5-20250929",
    "claude-haiku-4-5-20251001",
    "claude-opus-4-1-20250805",
    "claude-sonnet-4-20250514",
    "claude-3-7-sonnet-20250219",
    "claude-3-5-haiku-20241022",
];

/// `OpenAI` model ids.
pub const OPENAI_MODELS: &[&str] = &[
    "gpt-5",
    "gpt-5-mini",
    "gpt-4.1",
    "gpt-4.1-mini",
    "gpt-4o",
    "gpt-4o-mini",
    "o3",
    "o4-mini",
];

/// Gemini model ids.
pub const GOOGLE_MODELS: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
];

/// Where a model id routes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelRoute {
    /// Serving family.
    pub family: ProviderFamily,
    /// Model name sent to the provider.
    pub wire_model: String,
}

impl ModelRoute {
    fn new(family: ProviderFamily, wire_model: &str) -> Self {
        Self {
            family,
            wire_model: wire_model.to_string(),
        }
    }
}

/// Error building a registry from settings.
#[derive(Debug, thiserror::Error)]
#[error("model {model} maps to unknown provider family {family:?}")]
pub struct RegistryError {
    /// Offending model id.
    pub model: String,
    /// Family string as configured.
    pub family: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Model id → provider family lookup.
#[derive(Clone, Debug, Default)]
pub struct ModelRegistry {
    extra: HashMap<String, ProviderFamily>,
}

impl ModelRegistry {
    /// Registry with only the built-in tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in tables plus `settings.extra`.
    pub fn from_settings(settings: &ModelSettings) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for (model, family) in &settings.extra {
            let parsed = family.parse().map_err(|_| RegistryError {
                model: model.clone(),
                family: family.clone(),
            })?;
            registry.register(model.clone(), parsed);
        }
        Ok(registry)
    }

    /// Add or replace one model registration.
    pub fn register(&mut self, model: impl Into<String>, family: ProviderFamily) {
        let _ = self.extra.insert(model.into(), family);
    }

    /// Resolve a model id, or `None` if it is unknown.
    pub fn lookup(&self, model_id: &str) -> Option<ModelRoute> {
        if let Some(&family) = self.extra.get(model_id) {
            return Some(ModelRoute::new(family, model_id));
        }

        if let Some((prefix, bare)) = model_id.split_once('/') {
            if bare.is_empty() {
                return None;
            }
            let family: ProviderFamily = prefix.parse().ok()?;
            let known = match family {
                ProviderFamily::OpenRouter => true,
                _ => self.builtin_family(bare) == Some(family)
                    || self.extra.get(bare) == Some(&family),
            };
            return known.then(|| ModelRoute::new(family, bare));
        }

        self.builtin_family(model_id)
            .map(|family| ModelRoute::new(family, model_id))
    }

    /// Whether `model_id` resolves.
    pub fn contains(&self, model_id: &str) -> bool {
        self.lookup(model_id).is_some()
    }

    #[allow(clippy::unused_self)]
    fn builtin_family(&self, model_id: &str) -> Option<ProviderFamily> {
        if ANTHROPIC_MODELS.contains(&model_id) {
            Some(ProviderFamily::Anthropic)
        } else if OPENAI_MODELS.contains(&model_id) {
            Some(ProviderFamily::OpenAi)
        } else if GOOGLE_MODELS.contains(&model_id) {
            Some(ProviderFamily::Google)
        } else {
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn route(family: ProviderFamily, wire: &str) -> Option<ModelRoute> {
        Some(ModelRoute::new(family, wire))
    }

    #[test]
    fn builtin_exact_match() {
        let registry = ModelRegistry::new();
        assert_eq!(
            registry.lookup("claude-opus-4-6"),
            route(ProviderFamily::Anthropic, "claude-opus-4-6")
        );
        assert_eq!(registry.lookup("gpt-4o"), route(ProviderFamily::OpenAi, "gpt-4o"));
        assert_eq!(
            registry.lookup("gemini-2.5-pro"),
            route(ProviderFamily::Google, "gemini-2.5-pro")
        );
    }

    #[test]
    fn explicit_prefix_strips_family() {
        let registry = ModelRegistry::new();
        assert_eq!(
            registry.lookup("anthropic/claude-opus-4-6"),
            route(ProviderFamily::Anthropic, "claude-opus-4-6")
        );
        assert_eq!(registry.lookup("gemini/gemini-2.5-flash"), route(ProviderFamily::Google, "gemini-2.5-flash"));
    }

    #[test]
    fn explicit_prefix_rejects_cross_family_model() {
        let registry = ModelRegistry::new();
        assert_eq!(registry.lookup("openai/claude-opus-4-6"), None);
        assert_eq!(registry.lookup("anthropic/"), None);
    }

    #[test]
    fn openrouter_prefix_accepts_any_model() {
        let registry = ModelRegistry::new();
        assert_eq!(
            registry.lookup("openrouter/meta-llama/llama-3.3-70b-instruct"),
            route(ProviderFamily::OpenRouter, "meta-llama/llama-3.3-70b-instruct")
        );
    }

    #[test]
    fn unknown_model_is_none() {
        let registry = ModelRegistry::new();
        assert_eq!(registry.lookup("totally-unknown"), None);
        assert_eq!(registry.lookup("mistral/large"), None);
        assert!(!registry.contains(""));
    }

    #[test]
    fn extra_registrations_from_settings() {
        let mut settings = ModelSettings::default();
        let _ = settings.extra.insert("my-finetune".into(), "openai".into());
        let registry = ModelRegistry::from_settings(&settings).unwrap();
        assert_eq!(
            registry.lookup("my-finetune"),
            route(ProviderFamily::OpenAi, "my-finetune")
        );
        assert_eq!(
            registry.lookup("openai/my-finetune"),
            route(ProviderFamily::OpenAi, "my-finetune")
        );
    }

    #[test]
    fn extra_with_bad_family_is_rejected() {
        let mut settings = ModelSettings::default();
        let _ = settings.extra.insert("m".into(), "mystery".into());
        let err = ModelRegistry::from_settings(&settings).unwrap_err();
        assert_eq!(err.model, "m");
    }
}
