//! Inbound trigger data delivered by a bus subscription.

use chatbridge_protocol::{BridgeError, BridgeResult, EnvelopeIdentity, ProviderId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `{message, sessionId|conversationId, chatId, userId, ...}`. Fields this
/// crate does not know are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundTrigger {
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "sessionId")]
    pub conversation_id: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InboundTrigger {
    pub fn from_value(value: Value) -> BridgeResult<Self> {
        serde_json::from_value(value)
            .map_err(|error| BridgeError::Serialization(format!("invalid trigger: {error}")))
    }

    pub fn identity(&self, provider_id: ProviderId) -> BridgeResult<EnvelopeIdentity> {
        EnvelopeIdentity::new(
            self.chat_id.as_str(),
            self.conversation_id.as_str(),
            self.user_id.as_str(),
            provider_id,
        )
    }

    /// The user message, rejected when blank.
    pub fn prompt(&self) -> BridgeResult<&str> {
        let message = self.message.trim();
        if message.is_empty() {
            return Err(BridgeError::Validation { field: "message" });
        }
        Ok(message)
    }
}
