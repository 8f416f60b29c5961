//! # Retry/Fallback Executor
//!
//! Drives an [`AttemptPlan`]: configs are tried strictly in order, each one
//! for `max_retries + 1` attempts, and the first success ends the call.
//!
//! Per attempt:
//! 1. Ask the [`LiveInputRegistry`]; a dead request ends the call with
//!    [`CallOutcome::Cancelled`] and no provider call is made.
//! 2. Resolve the config's model. Resolution failures are fatal.
//! 3. Run the attempt closure.
//! 4. Non-retryable errors return immediately. Retryable errors back off
//!    `min(base * 2^attempt, cap)` before the next attempt of the same
//!    config, or fall through to the next config once retries run out.
//!
//! When every config is exhausted the last error is returned.

use std::future::Future;
use std::sync::Arc;

use relay_core::ids::AttributionId;
use relay_core::retry::BackoffPolicy;
use tracing::{debug, error, info, warn};

use crate::client::CallContext;
use crate::error::{CallOutcome, DispatchError, DispatchResult};
use crate::live_input::LiveInputRegistry;
use crate::plan::AttemptPlan;
use crate::resolver::{ProviderResolver, ResolvedProvider};

/// What the attempt closure receives.
#[derive(Clone, Debug)]
pub struct Attempt {
    /// Position of the config in the plan.
    pub config_index: usize,
    /// Zero-based attempt number within the config.
    pub attempt: u32,
    /// Logical model id from the plan.
    pub model: String,
    /// Resolved provider for `model`.
    pub resolved: ResolvedProvider,
}

/// Runs attempt plans with backoff, fallback and cancellation checks.
#[derive(Clone, Debug)]
pub struct RetryExecutor {
    resolver: Arc<ProviderResolver>,
    live_inputs: Arc<LiveInputRegistry>,
    backoff: BackoffPolicy,
}

impl RetryExecutor {
    /// Create an executor.
    pub fn new(
        resolver: Arc<ProviderResolver>,
        live_inputs: Arc<LiveInputRegistry>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            resolver,
            live_inputs,
            backoff,
        }
    }

    /// The backoff policy in use.
    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Walk `plan`, calling `attempt_fn` once per attempt until one succeeds.
    pub async fn run<T, F, Fut>(
        &self,
        plan: &AttemptPlan,
        ctx: &CallContext,
        mut attempt_fn: F,
    ) -> DispatchResult<CallOutcome<T>>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = DispatchResult<T>>,
    {
        let configs = plan.configs();
        let scope = ctx.attribution_id.as_ref().map(AttributionId::as_str);
        let mut last_error: Option<DispatchError> = None;

        for (config_index, config) in configs.iter().enumerate() {
            for attempt in 0..=config.max_retries {
                if !self
                    .live_inputs
                    .check_live_user_input(ctx.user_id.as_ref(), &ctx.request_id)
                {
                    info!(
                        request_id = %ctx.request_id,
                        model = %config.model,
                        attempt,
                        "request no longer live, abandoning call"
                    );
                    metrics::counter!("relay_cancelled_calls_total").increment(1);
                    return Ok(CallOutcome::Cancelled {
                        request_id: ctx.request_id.clone(),
                    });
                }

                let resolved = self.resolver.resolve(&config.model, scope)?;
                let provider = resolved.family;

                let result = attempt_fn(Attempt {
                    config_index,
                    attempt,
                    model: config.model.clone(),
                    resolved,
                })
                .await;

                let err = match result {
                    Ok(value) => {
                        if attempt > 0 || config_index > 0 {
                            debug!(
                                request_id = %ctx.request_id,
                                provider = %provider,
                                model = %config.model,
                                attempt,
                                config_index,
                                "call succeeded after retry"
                            );
                        }
                        return Ok(CallOutcome::Completed(value));
                    }
                    Err(err) => err,
                };

                if !err.is_retryable() {
                    error!(
                        request_id = %ctx.request_id,
                        provider = %provider,
                        model = %config.model,
                        attempt,
                        category = err.category(),
                        error = %err,
                        "non-retryable provider error"
                    );
                    metrics::counter!("relay_call_failures_total", "category" => err.category())
                        .increment(1);
                    return Err(err);
                }

                if attempt < config.max_retries {
                    let delay = self.backoff.delay(attempt, err.retry_after_ms());
                    warn!(
                        request_id = %ctx.request_id,
                        provider = %provider,
                        model = %config.model,
                        attempt,
                        max_retries = config.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        category = err.category(),
                        error = %err,
                        "retrying after transient error"
                    );
                    metrics::counter!("relay_retries_total", "provider" => provider.as_str())
                        .increment(1);
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(err);
            }

            if let Some(next) = configs.get(config_index + 1) {
                warn!(
                    request_id = %ctx.request_id,
                    model = %config.model,
                    next_model = %next.model,
                    "retries exhausted, falling back to next model"
                );
                metrics::counter!("relay_fallbacks_total").increment(1);
            }
        }

        let err = last_error
            .unwrap_or_else(|| DispatchError::InvalidPlan("attempt plan is empty".to_string()));
        error!(
            request_id = %ctx.request_id,
            configs = configs.len(),
            category = err.category(),
            error = %err,
            "all attempts failed"
        );
        metrics::counter!("relay_call_failures_total", "category" => err.category()).increment(1);
        Err(err)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
