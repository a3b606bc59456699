//! Typed id wrappers for envelopes.
//!
//! Ids are opaque String wrappers (serde-transparent). Correlation ids are
//! supplied by the inbound trigger; only [`EnvelopeId`] is generated here.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(
    /// Unique token for one published envelope.
    EnvelopeId
);
typed_id!(
    /// Scopes envelopes to a single rendered chat surface.
    ChatId
);
typed_id!(
    /// Links related envelopes across a session.
    ConversationId
);
typed_id!(
    /// The end user the conversation belongs to.
    UserId
);
typed_id!(
    /// Identity of the adapter instance that produced an envelope.
    ProviderId
);

impl EnvelopeId {
    /// `<epoch-millis>-<random>`; sorts roughly by creation time.
    pub fn generate(timestamp_ms: u64) -> Self {
        Self(format!("{timestamp_ms}-{}", uuid::Uuid::new_v4().simple()))
    }
}

impl ProviderId {
    /// Composite of the workflow and node that host the adapter.
    pub fn from_parts(workflow_id: &str, node_id: &str) -> Self {
        Self(format!("{workflow_id}:{node_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_envelope_ids_are_unique() {
        let a = EnvelopeId::generate(1_700_000_000_000);
        let b = EnvelopeId::generate(1_700_000_000_000);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("1700000000000-"));
    }

    #[test]
    fn provider_id_from_parts() {
        let id = ProviderId::from_parts("wf-42", "chat-node");
        assert_eq!(id.as_str(), "wf-42:chat-node");
    }

    #[test]
    fn only_the_empty_string_is_empty() {
        assert!(ChatId::from_string("").is_empty());
        assert!(!ChatId::from_string("  ").is_empty());
        assert!(!UserId::from("u1").is_empty());
    }

    #[test]
    fn typed_id_serializes_transparently() {
        let id = ConversationId::from_string("conv-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"conv-1\"");
        let back: ConversationId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
