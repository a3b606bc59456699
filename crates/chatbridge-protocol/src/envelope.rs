//! Envelope construction.
//!
//! An [`EnvelopeIdentity`] holds the validated correlation ids of one adapter
//! invocation. Each call to [`EnvelopeIdentity::base`] mints a fresh
//! [`EnvelopeBase`] (new id, new timestamp) which is consumed by exactly one
//! encoder, so no two envelopes ever share an id.

use crate::error::{BridgeError, BridgeResult};
use crate::ids::{ChatId, ConversationId, EnvelopeId, ProviderId, UserId};
use crate::message::MessageKind;
use crate::state::ConversationState;
use serde::{Deserialize, Serialize};

/// Current time in milliseconds since UNIX epoch.
pub fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Validated correlation ids shared by every envelope of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeIdentity {
    chat_id: ChatId,
    conversation_id: ConversationId,
    user_id: UserId,
    provider_id: ProviderId,
}

impl EnvelopeIdentity {
    pub fn new(
        chat_id: impl Into<ChatId>,
        conversation_id: impl Into<ConversationId>,
        user_id: impl Into<UserId>,
        provider_id: impl Into<ProviderId>,
    ) -> BridgeResult<Self> {
        let chat_id = chat_id.into();
        let conversation_id = conversation_id.into();
        let user_id = user_id.into();

        if chat_id.is_empty() {
            return Err(BridgeError::Validation { field: "chatId" });
        }
        if conversation_id.is_empty() {
            return Err(BridgeError::Validation {
                field: "conversationId",
            });
        }
        if user_id.is_empty() {
            return Err(BridgeError::Validation { field: "userId" });
        }

        Ok(Self {
            chat_id,
            conversation_id,
            user_id,
            provider_id: provider_id.into(),
        })
    }

    /// Mint a base envelope; `state` defaults to `active`.
    pub fn base(&self, state: Option<ConversationState>) -> EnvelopeBase {
        let timestamp = now_millis();
        EnvelopeBase {
            id: EnvelopeId::generate(timestamp),
            identity: self.clone(),
            timestamp,
            state: state.unwrap_or_default(),
        }
    }

    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }
}

/// Base fields of an envelope that has not been given a payload yet.
#[derive(Debug)]
pub struct EnvelopeBase {
    id: EnvelopeId,
    identity: EnvelopeIdentity,
    timestamp: u64,
    state: ConversationState,
}

impl EnvelopeBase {
    pub fn id(&self) -> &EnvelopeId {
        &self.id
    }

    pub fn identity(&self) -> &EnvelopeIdentity {
        &self.identity
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub(crate) fn with_error_state(mut self) -> Self {
        self.state = ConversationState::Error;
        self
    }

    pub(crate) fn into_envelope(self, message: MessageKind, error: Option<String>) -> Envelope {
        let EnvelopeIdentity {
            chat_id,
            conversation_id,
            user_id,
            provider_id,
        } = self.identity;
        Envelope {
            id: self.id,
            chat_id,
            conversation_id,
            user_id,
            provider_id,
            timestamp: self.timestamp,
            state: self.state,
            message,
            error,
        }
    }
}

/// Validate the identity triple and mint a base envelope in one step.
pub fn build_base_envelope(
    chat_id: &str,
    conversation_id: &str,
    user_id: &str,
    provider_id: &str,
    state: Option<ConversationState>,
) -> BridgeResult<EnvelopeBase> {
    EnvelopeIdentity::new(chat_id, conversation_id, user_id, provider_id)
        .map(|identity| identity.base(state))
}

/// One immutable outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    id: EnvelopeId,
    chat_id: ChatId,
    conversation_id: ConversationId,
    user_id: UserId,
    provider_id: ProviderId,
    /// Milliseconds since UNIX epoch.
    timestamp: u64,
    state: ConversationState,
    #[serde(flatten)]
    message: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Envelope {
    pub fn id(&self) -> &EnvelopeId {
        &self.id
    }

    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn message(&self) -> &MessageKind {
        &self.message
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn type_name(&self) -> &'static str {
        self.message.type_name()
    }

    /// Text of a messageChunk envelope.
    pub fn chunk_text(&self) -> Option<&str> {
        match &self.message {
            MessageKind::MessageChunk { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Index of a stream chunk envelope.
    pub fn chunk_index(&self) -> Option<u32> {
        match &self.message {
            MessageKind::MessageChunk { chunk_index, .. } => *chunk_index,
            _ => None,
        }
    }
}
