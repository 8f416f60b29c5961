//! Branded string identifiers.
//!
//! Each identifier is a newtype over `String` so a session id can never be
//! passed where a request id is expected. Freshly minted ids carry a short
//! prefix and a UUID v7 suffix, which keeps them time-ordered.
//!
//! Request ids are hierarchical by convention: a derived request (child
//! agent, continuation) extends its root id as a string prefix. The
//! cancellation gate relies on this to let children inherit liveness.
//! Ids containing [`ASYNC_BRANCH_MARKER`] are independent branches that may
//! outlive their parent.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a new time-ordered id with this type's prefix.
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            /// Wrap an existing id string without validation.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id!(
    /// Client session the call belongs to.
    SessionId,
    "sess"
);
branded_id!(
    /// User input (request) id. Root ids are registered with the live-input gate.
    RequestId,
    "req"
);
branded_id!(
    /// End user on whose behalf the call runs.
    UserId,
    "user"
);
branded_id!(
    /// Id of one provider response, reported to the usage sink.
    MessageId,
    "msg"
);
branded_id!(
    /// Tagging scope used for provider-side usage attribution.
    AttributionId,
    "attr"
);

/// Infix that marks a request id as an independent async branch.
pub const ASYNC_BRANCH_MARKER: &str = "-async-";

impl RequestId {
    /// Derive a child request id that inherits this id as its prefix.
    pub fn child(&self, suffix: &str) -> Self {
        Self(format!("{}-{suffix}", self.0))
    }

    /// Derive an async branch that stays live after this request ends.
    pub fn async_branch(&self, suffix: &str) -> Self {
        Self(format!("{}{ASYNC_BRANCH_MARKER}{suffix}", self.0))
    }

    /// Whether this id was minted as an async branch.
    pub fn is_async_branch(&self) -> bool {
        self.0.contains(ASYNC_BRANCH_MARKER)
    }

    /// Whether `self` is `root` or was derived from it.
    pub fn descends_from(&self, root: &str) -> bool {
        self.0.starts_with(root)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
