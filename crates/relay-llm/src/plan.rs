//! # Config Normalizer
//!
//! Callers name models in three shapes: a bare model id, a single
//! `{model, retries}` config, or an ordered fallback list of configs. All of
//! them normalize to an [`AttemptPlan`], a non-empty ordered list of
//! [`AttemptConfig`]s with every retry count filled in.

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};

/// One step of an attempt plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptConfig {
    /// Logical model id.
    pub model: String,
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries: u32,
}

/// A `{model, retries}` pair as the caller supplies it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Logical model id.
    pub model: String,
    /// Retry count; the plan default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

impl ModelConfig {
    /// Config with an explicit retry count.
    pub fn new(model: impl Into<String>, retries: u32) -> Self {
        Self {
            model: model.into(),
            retries: Some(retries),
        }
    }
}

/// Every accepted shape of model selection.
///
/// Deserializes from a string, an object, or an array of objects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelSelection {
    /// A bare model id.
    Model(String),
    /// One config.
    Config(ModelConfig),
    /// Ordered fallback list.
    List(Vec<ModelConfig>),
}

impl From<&str> for ModelSelection {
    fn from(model: &str) -> Self {
        Self::Model(model.to_string())
    }
}

impl From<String> for ModelSelection {
    fn from(model: String) -> Self {
        Self::Model(model)
    }
}

impl From<ModelConfig> for ModelSelection {
    fn from(config: ModelConfig) -> Self {
        Self::Config(config)
    }
}

impl From<Vec<ModelConfig>> for ModelSelection {
    fn from(configs: Vec<ModelConfig>) -> Self {
        Self::List(configs)
    }
}

/// Non-empty ordered list of attempt configs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptPlan {
    configs: Vec<AttemptConfig>,
}

impl AttemptPlan {
    /// Normalize a selection, filling unset retries with `default_retries`.
    ///
    /// Fails on an empty list or an empty model id.
    pub fn normalize(selection: ModelSelection, default_retries: u32) -> DispatchResult<Self> {
        let raw = match selection {
            ModelSelection::Model(model) => vec![ModelConfig {
                model,
                retries: None,
            }],
            ModelSelection::Config(config) => vec![config],
            ModelSelection::List(configs) => configs,
        };

        if raw.is_empty() {
            return Err(DispatchError::InvalidPlan(
                "model list must not be empty".to_string(),
            ));
        }

        let configs = raw
            .into_iter()
            .enumerate()
            .map(|(index, config)| {
                let model = config.model.trim();
                if model.is_empty() {
                    return Err(DispatchError::InvalidPlan(format!(
                        "config {index} has an empty model id"
                    )));
                }
                Ok(AttemptConfig {
                    model: model.to_string(),
                    max_retries: config.retries.unwrap_or(default_retries),
                })
            })
            .collect::<DispatchResult<Vec<_>>>()?;

        Ok(Self { configs })
    }

    /// Configs in the order they will be tried.
    pub fn configs(&self) -> &[AttemptConfig] {
        &self.configs
    }

    /// Number of configs.
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Upper bound on provider calls this plan can make.
    pub fn max_attempts(&self) -> u64 {
        self.configs
            .iter()
            .map(|c| u64::from(c.max_retries) + 1)
            .sum()
    }
}

impl<'a> IntoIterator for &'a AttemptPlan {
    type Item = &'a AttemptConfig;
    type IntoIter = std::slice::Iter<'a, AttemptConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.configs.iter()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
