//! Caller-facing error and outcome types.
//!
//! Adapters fail with [`ProviderError`]. Before anything reaches the caller
//! it is wrapped in a [`DispatchError`] carrying the provider family and
//! model, so a log line or error message always says which backend failed.
//!
//! Cancellation is not an error: a call whose root request is no longer live
//! returns [`CallOutcome::Cancelled`] from both the streaming and the
//! non-streaming entry points.

use relay_core::ids::RequestId;

use crate::provider::{ProviderError, ProviderFamily};

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors surfaced to callers of the engine.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Unknown model id or missing provider credentials. Never retried.
    #[error("configuration error for model {model}: {message}")]
    Configuration {
        /// Requested model id.
        model: String,
        /// What is wrong.
        message: String,
    },

    /// Provider call failed.
    #[error("{provider} call to {model} failed: {source}")]
    Provider {
        /// Provider family.
        provider: ProviderFamily,
        /// Model id as requested.
        model: String,
        /// HTTP status, if the failure had one.
        status: Option<u16>,
        /// Underlying provider error.
        #[source]
        source: ProviderError,
    },

    /// Provider reported an error frame after the stream opened.
    #[error("stream error from {provider} ({model}): {message}")]
    Stream {
        /// Provider family.
        provider: ProviderFamily,
        /// Model id as requested.
        model: String,
        /// Provider-supplied cause.
        message: String,
        /// Whether a fresh attempt could succeed.
        retryable: bool,
    },

    /// The model selection could not be turned into an attempt plan.
    #[error("invalid attempt plan: {0}")]
    InvalidPlan(String),
}

impl DispatchError {
    /// Wrap a provider error with dispatch context.
    pub fn provider(provider: ProviderFamily, model: impl Into<String>, source: ProviderError) -> Self {
        Self::Provider {
            provider,
            model: model.into(),
            status: source.status(),
            source,
        }
    }

    /// Whether the executor may retry or fall back after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { source, .. } => source.is_retryable(),
            Self::Stream { retryable, .. } => *retryable,
            Self::Configuration { .. } | Self::InvalidPlan(_) => false,
        }
    }

    /// Server-suggested retry delay, if the provider sent one.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::Provider { source, .. } => source.retry_after_ms(),
            _ => None,
        }
    }

    /// Short category label for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Provider { source, .. } => source.category(),
            Self::Stream { .. } => "stream",
            Self::InvalidPlan(_) => "plan",
        }
    }
}

/// Outcome of a call that was allowed to run to a conclusion.
#[derive(Debug)]
#[must_use]
pub enum CallOutcome<T> {
    /// The call produced a value.
    Completed(T),
    /// The owning root request stopped being live before an attempt started.
    Cancelled {
        /// Request that was abandoned.
        request_id: RequestId,
    },
}

impl<T> CallOutcome<T> {
    /// Whether the call was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled { .. } => None,
        }
    }

    /// Transform the completed value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            Self::Completed(value) => CallOutcome::Completed(f(value)),
            Self::Cancelled { request_id } => CallOutcome::Cancelled { request_id },
        }
    }
}

/// Failure of a single tool envelope. Never aborts the surrounding stream.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    /// A close marker arrived with no matching open marker in the buffer.
    #[error("unexpected closing tag")]
    UnexpectedClosingTag,
    /// The envelope body is not valid JSON.
    #[error("invalid JSON payload: {reason}")]
    InvalidPayload {
        /// Parser message.
        reason: String,
    },
    /// The envelope body is valid JSON but not an object.
    #[error("payload must be a JSON object, got {found}")]
    PayloadNotObject {
        /// JSON type that was found.
        found: &'static str,
    },
    /// The tag names a tool with no registered handler.
    #[error("no handler registered for this tool")]
    UnknownTool,
    /// Another tool's open marker arrived before this tool closed.
    #[error("tool call interrupted by <{by}>")]
    Superseded {
        /// Tool whose open marker interrupted this one.
        by: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
