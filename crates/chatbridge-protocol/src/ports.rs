//! Collaborator ports.
//!
//! These traits are the only boundary between the envelope contract and
//! external implementations (bus clients, model provider clients and
//! observability backends).
//!
//! Object-safety note:
//! - Async traits use `async-trait` for dyn-dispatch.
//! - Model streams are boxed trait objects (`FragmentStream`).

use crate::envelope::Envelope;
use crate::error::{BridgeError, BridgeResult};
use crate::ids::{ConversationId, ProviderId};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Lazy, forward-only sequence of text fragments from a model stream.
pub type FragmentStream = BoxStream<'static, BridgeResult<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub model: String,
    pub vectors: Vec<Vec<f32>>,
}

impl Embedding {
    pub fn dimensions(&self) -> usize {
        self.vectors.first().map_or(0, Vec::len)
    }
}

/// Context handed to a [`FailureReporter`] when a model stream breaks.
#[derive(Debug)]
pub struct PartialFailure<'a> {
    pub model: &'a str,
    pub conversation_id: &'a ConversationId,
    pub provider_id: &'a ProviderId,
    pub fragments_received: u32,
    pub error: &'a BridgeError,
}

#[async_trait]
pub trait EnvelopePublisher: Send + Sync {
    async fn publish(&self, channel: &str, envelope: &Envelope) -> BridgeResult<()>;
}

#[async_trait]
pub trait ChatModelPort: Send + Sync {
    async fn stream_chat(&self, request: ChatRequest) -> BridgeResult<FragmentStream>;
}

#[async_trait]
pub trait EmbeddingModelPort: Send + Sync {
    async fn embed(&self, request: EmbeddingRequest) -> BridgeResult<Embedding>;
}

pub trait FailureReporter: Send + Sync {
    fn report_partial_failure(&self, failure: &PartialFailure<'_>);
}
