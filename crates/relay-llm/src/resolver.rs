//! # Provider Resolver
//!
//! Turns a logical model id into a [`ResolvedProvider`]: the serving family,
//! its wire dialect, the model name to send, and a shared adapter.
//!
//! Adapters are memoized per `(family, attribution scope)`. Two calls that
//! miss the cache at the same time may both build an adapter; the first
//! insert wins and the other is dropped. No lock is held while building.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use relay_settings::{
    ANTHROPIC_BASE_URL, GOOGLE_BASE_URL, OPENAI_BASE_URL, OPENROUTER_BASE_URL, ProviderEndpoint,
    ProviderSettings, RelaySettings,
};
use tracing::debug;

use crate::anthropic::{AnthropicAdapter, AnthropicConfig};
use crate::error::{DispatchError, DispatchResult};
use crate::google::{GoogleAdapter, GoogleConfig};
use crate::models::ModelRegistry;
use crate::openai::{OpenAiAdapter, OpenAiConfig};
use crate::provider::{Dialect, ProviderAdapter, ProviderError, ProviderFamily, ProviderResult};

// ─────────────────────────────────────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Builds adapters on a resolver cache miss.
pub trait AdapterFactory: Send + Sync {
    /// Build an adapter for `family`, tagging requests with `scope` if given.
    ///
    /// Missing credentials are reported as [`ProviderError::Auth`].
    fn build(&self, family: ProviderFamily, scope: Option<&str>)
    -> ProviderResult<Arc<dyn ProviderAdapter>>;
}

/// Factory producing HTTP adapters from provider settings.
#[derive(Clone, Debug)]
pub struct HttpAdapterFactory {
    settings: ProviderSettings,
    client: reqwest::Client,
}

impl HttpAdapterFactory {
    /// Create a factory sharing one connection pool across all adapters.
    pub fn new(settings: ProviderSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }
}

/// API key and base URL with the family default applied.
fn credentials(
    family: ProviderFamily,
    endpoint: &ProviderEndpoint,
    default_base_url: &str,
) -> ProviderResult<(String, String)> {
    let api_key = endpoint
        .api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ProviderError::Auth {
            message: format!("no API key configured for {family}"),
        })?;
    let base_url = if endpoint.base_url.trim().is_empty() {
        default_base_url
    } else {
        endpoint.base_url.trim_end_matches('/')
    };
    Ok((api_key.to_string(), base_url.to_string()))
}

impl AdapterFactory for HttpAdapterFactory {
    fn build(
        &self,
        family: ProviderFamily,
        scope: Option<&str>,
    ) -> ProviderResult<Arc<dyn ProviderAdapter>> {
        let scope = scope.map(str::to_string);
        let adapter: Arc<dyn ProviderAdapter> = match family {
            ProviderFamily::Anthropic => {
                let (api_key, base_url) =
                    credentials(family, &self.settings.anthropic, ANTHROPIC_BASE_URL)?;
                Arc::new(AnthropicAdapter::new(
                    AnthropicConfig {
                        api_key,
                        base_url,
                        user_id: scope,
                    },
                    self.client.clone(),
                ))
            }
            ProviderFamily::OpenAi => {
                let (api_key, base_url) =
                    credentials(family, &self.settings.openai, OPENAI_BASE_URL)?;
                Arc::new(OpenAiAdapter::new(
                    OpenAiConfig::openai(api_key, base_url, scope),
                    self.client.clone(),
                ))
            }
            ProviderFamily::OpenRouter => {
                let openrouter = &self.settings.openrouter;
                let (api_key, base_url) =
                    credentials(family, &openrouter.endpoint, OPENROUTER_BASE_URL)?;
                let mut config = OpenAiConfig::openrouter(api_key, base_url, scope);
                config.app_title.clone_from(&openrouter.app_title);
                config.app_url.clone_from(&openrouter.app_url);
                Arc::new(OpenAiAdapter::new(config, self.client.clone()))
            }
            ProviderFamily::Google => {
                let (api_key, base_url) =
                    credentials(family, &self.settings.google, GOOGLE_BASE_URL)?;
                Arc::new(GoogleAdapter::new(
                    GoogleConfig { api_key, base_url },
                    self.client.clone(),
                ))
            }
        };
        Ok(adapter)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// What a model id resolved to.
#[derive(Clone)]
pub struct ResolvedProvider {
    /// Serving family.
    pub family: ProviderFamily,
    /// Wire format.
    pub dialect: Dialect,
    /// Model name to send.
    pub wire_model: String,
    /// Shared adapter.
    pub adapter: Arc<dyn ProviderAdapter>,
}

impl fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("family", &self.family)
            .field("dialect", &self.dialect)
            .field("wire_model", &self.wire_model)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ClientKey {
    family: ProviderFamily,
    scope: Option<String>,
}

/// Model id → memoized adapter.
pub struct ProviderResolver {
    registry: ModelRegistry,
    factory: Arc<dyn AdapterFactory>,
    adapters: DashMap<ClientKey, Arc<dyn ProviderAdapter>>,
}

impl fmt::Debug for ProviderResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderResolver")
            .field("registry", &self.registry)
            .field("cached_adapters", &self.adapters.len())
            .finish_non_exhaustive()
    }
}

impl ProviderResolver {
    /// Create a resolver over a registry and factory.
    pub fn new(registry: ModelRegistry, factory: Arc<dyn AdapterFactory>) -> Self {
        Self {
            registry,
            factory,
            adapters: DashMap::new(),
        }
    }

    /// Create an HTTP-backed resolver from settings.
    pub fn from_settings(settings: &RelaySettings, client: reqwest::Client) -> DispatchResult<Self> {
        let factory = HttpAdapterFactory::new(settings.providers.clone(), client);
        Self::with_factory(settings, Arc::new(factory))
    }

    /// Create a resolver over the settings' model registry and a custom factory.
    pub fn with_factory(
        settings: &RelaySettings,
        factory: Arc<dyn AdapterFactory>,
    ) -> DispatchResult<Self> {
        let registry =
            ModelRegistry::from_settings(&settings.models).map_err(|e| DispatchError::Configuration {
                model: e.model.clone(),
                message: e.to_string(),
            })?;
        Ok(Self::new(registry, factory))
    }

    /// Resolve `model`, building and caching an adapter for `scope` if needed.
    ///
    /// Unknown models and missing credentials are configuration errors.
    pub fn resolve(&self, model: &str, scope: Option<&str>) -> DispatchResult<ResolvedProvider> {
        let route = self
            .registry
            .lookup(model)
            .ok_or_else(|| DispatchError::Configuration {
                model: model.to_string(),
                message: "unknown model id".to_string(),
            })?;

        let adapter = self.adapter_for(route.family, scope).map_err(|e| {
            DispatchError::Configuration {
                model: model.to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(ResolvedProvider {
            family: route.family,
            dialect: route.family.dialect(),
            wire_model: route.wire_model,
            adapter,
        })
    }

    /// Number of memoized adapters.
    pub fn cached_adapters(&self) -> usize {
        self.adapters.len()
    }

    /// The model registry.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    fn adapter_for(
        &self,
        family: ProviderFamily,
        scope: Option<&str>,
    ) -> ProviderResult<Arc<dyn ProviderAdapter>> {
        let key = ClientKey {
            family,
            scope: scope.map(str::to_string),
        };
        if let Some(adapter) = self.adapters.get(&key) {
            return Ok(Arc::clone(adapter.value()));
        }

        let built = self.factory.build(family, scope)?;
        debug!(provider = %family, scope = scope.unwrap_or("-"), "built provider adapter");
        let entry = self.adapters.entry(key).or_insert(built);
        Ok(Arc::clone(entry.value()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
