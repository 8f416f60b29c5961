//! Canonical stream events.
//!
//! Every provider wire format is normalized into this one vocabulary before
//! it leaves the engine. Events for one call are delivered strictly in the
//! order the provider produced them; nothing is reordered or batched.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// CanonicalEvent
// ─────────────────────────────────────────────────────────────────────────────

/// Provider-independent streaming event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanonicalEvent {
    /// Incremental response text.
    TextDelta {
        /// Text fragment.
        text: String,
    },
    /// Incremental reasoning ("thinking") text.
    ReasoningDelta {
        /// Reasoning fragment.
        text: String,
    },
    /// Error frame reported by the provider inside an otherwise healthy stream.
    ErrorFrame {
        /// Provider-supplied description.
        cause: String,
    },
}

impl CanonicalEvent {
    /// Text delta helper.
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    /// Reasoning delta helper.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::ReasoningDelta { text: text.into() }
    }

    /// Error frame helper.
    pub fn error_frame(cause: impl Into<String>) -> Self {
        Self::ErrorFrame {
            cause: cause.into(),
        }
    }

    /// The response text carried by this event, if it is a text delta.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::TextDelta { text } => Some(text),
            _ => None,
        }
    }

    /// Whether this is an error frame.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::ErrorFrame { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn serde_tagged_format() {
        let json = serde_json::to_value(CanonicalEvent::text("hi")).unwrap();
        assert_eq!(json["type"], "text_delta");
        assert_eq!(json["text"], "hi");

        let json = serde_json::to_value(CanonicalEvent::error_frame("overloaded")).unwrap();
        assert_eq!(json["type"], "error_frame");
        assert_eq!(json["cause"], "overloaded");
    }

    #[test]
    fn as_text_only_for_text_deltas() {
        assert_eq!(CanonicalEvent::text("a").as_text(), Some("a"));
        assert_eq!(CanonicalEvent::reasoning("b").as_text(), None);
        assert!(CanonicalEvent::error_frame("c").is_error());
    }

    #[test]
    fn deserializes_wire_shapes() {
        let event: CanonicalEvent =
            serde_json::from_str(r#"{"type":"reasoning_delta","text":"plan"}"#).unwrap();
        assert_matches!(event, CanonicalEvent::ReasoningDelta { ref text } if text == "plan");

        let event: CanonicalEvent =
            serde_json::from_str(r#"{"type":"error_frame","cause":"overloaded"}"#).unwrap();
        assert_matches!(event, CanonicalEvent::ErrorFrame { ref cause } if cause == "overloaded");

        let unknown = serde_json::from_str::<CanonicalEvent>(r#"{"type":"tool_call"}"#);
        assert_matches!(unknown, Err(_));
    }
}
