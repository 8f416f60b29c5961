//! # Tag Protocol
//!
//! Models invoke tools by writing `<name>{json}</name>` envelopes into their
//! text output. [`ToolTagParser`] recognizes envelopes incrementally, even
//! when markers are split across stream fragments, and [`ToolHandlers`]
//! routes the results to per-tool callbacks.
//!
//! A bad envelope (malformed JSON, unknown tool, stray close marker) is
//! reported through the error callback and never interrupts the text.

mod dispatch;
mod parser;

pub use dispatch::{ToolHandlers, process_stream_with_tags};
pub use parser::{TagEvent, ToolTagParser};
