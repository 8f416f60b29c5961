//! # relay-core
//!
//! Shared vocabulary for the relay LLM dispatch engine.
//!
//! Every other relay crate depends on these types:
//!
//! - **Branded IDs**: `SessionId`, `RequestId`, `UserId`, `MessageId`, `AttributionId`
//! - **Messages**: [`messages::Message`] with `System` / `User` / `Assistant` roles
//! - **Canonical events**: [`events::CanonicalEvent`], the provider-independent stream vocabulary
//! - **Usage**: [`usage::UsageSummary`] with cache-aware token accounting
//! - **Retry math**: exponential backoff and `Retry-After` parsing
//! - **Logging**: `tracing` subscriber setup and log capture for tests

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod retry;
pub mod text;
pub mod usage;

pub use events::CanonicalEvent;
pub use ids::{ASYNC_BRANCH_MARKER, AttributionId, MessageId, RequestId, SessionId, UserId};
pub use messages::{Message, Role};
pub use usage::UsageSummary;
