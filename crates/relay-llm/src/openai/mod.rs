//! OpenAI-compatible chat completions adapter (`OpenAI` and `OpenRouter`).

pub mod provider;
pub mod stream_handler;
pub mod types;

pub use provider::OpenAiAdapter;
pub use types::OpenAiConfig;
