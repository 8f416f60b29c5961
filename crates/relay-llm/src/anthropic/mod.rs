//! Anthropic Messages API adapter.

pub mod provider;
pub mod stream_handler;
pub mod types;

pub use provider::AnthropicAdapter;
pub use types::AnthropicConfig;
