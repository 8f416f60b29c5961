//! Google Gemini adapter.

pub mod provider;
pub mod stream_handler;
pub mod types;

pub use provider::GoogleAdapter;
pub use types::GoogleConfig;
