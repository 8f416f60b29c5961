//! # relay-llm
//!
//! Streaming dispatch engine for LLM providers.
//!
//! A call flows through these layers:
//!
//! 1. [`plan`]: normalize a model, a `{model, retries}` config, or an ordered
//!    list of configs into an [`AttemptPlan`](plan::AttemptPlan)
//! 2. [`executor`]: walk the plan in order with exponential backoff,
//!    consulting the [`live_input`] gate before every attempt
//! 3. [`resolver`]: map each model id to a memoized [`ProviderAdapter`]
//! 4. Provider adapters ([`anthropic`], [`openai`], [`google`]): HTTP + SSE
//!    into [`StreamChunk`]s
//! 5. [`normalizer`]: enforce the error-frame policy, unify usage, and report
//!    to the [`UsageSink`](usage::UsageSink) exactly once
//! 6. [`tags`]: extract `<tool>{json}</tool>` envelopes from the text stream
//!
//! [`LlmClient`](client::LlmClient) ties the layers together.

#![deny(unsafe_code)]

pub mod anthropic;
pub mod client;
pub mod error;
pub mod error_parsing;
pub mod executor;
pub mod google;
pub mod live_input;
pub mod mock;
pub mod models;
pub mod normalizer;
pub mod openai;
pub mod plan;
pub mod provider;
pub mod resolver;
pub mod sse;
pub mod stream_pipeline;
pub mod tags;
pub mod usage;

pub use client::{CallContext, CallRequest, Completion, LlmClient};
pub use error::{CallOutcome, DispatchError, DispatchResult, TagError};
pub use live_input::{LiveInputGuard, LiveInputRegistry};
pub use normalizer::{NormalizedStream, TextStream};
pub use plan::{AttemptConfig, AttemptPlan, ModelConfig, ModelSelection};
pub use provider::{
    Dialect, ModelRequest, ProviderAdapter, ProviderError, ProviderFamily, ProviderResult,
    RawStream, RequestOptions, StreamChunk,
};
pub use resolver::{AdapterFactory, HttpAdapterFactory, ProviderResolver, ResolvedProvider};
pub use tags::{TagEvent, ToolHandlers, ToolTagParser, process_stream_with_tags};
pub use usage::{NoopUsageSink, ProviderUsage, UsageRecord, UsageSink, UsageSinkError};
