//! # chatbridge-protocol — envelope contract
//!
//! Shared types for every chatbridge adapter that publishes onto the message
//! bus. The crate has no runtime dependency (no tokio) so it can be used as a
//! pure contract crate by any producer or consumer of envelopes.
//!
//! ## Module Overview
//!
//! - [`ids`] — Typed id wrappers (EnvelopeId, ChatId, ConversationId, UserId, ProviderId)
//! - [`state`] — ConversationState and the streaming-phase default mapping
//! - [`envelope`] — EnvelopeIdentity, EnvelopeBase, Envelope
//! - [`message`] — MessageKind payload variants and MessageInput
//! - [`payload`] — JsonPayload normalization of dynamic JSON inputs
//! - [`encode`] — Message variant encoders
//! - [`ports`] — Collaborator ports (publisher, chat model, embedding model, failure reporter)
//! - [`error`] — BridgeError, BridgeResult

pub mod encode;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod message;
pub mod payload;
pub mod ports;
pub mod state;

pub use encode::{
    STREAM_CLOSED_TEXT, encode, encode_action_suggestion, encode_failure, encode_image_response,
    encode_json_data, encode_json_data_value, encode_message_chunk, encode_metadata,
    encode_progress_update, encode_stream_chunk, encode_text, encode_tool_output, json_items,
};
pub use envelope::{Envelope, EnvelopeBase, EnvelopeIdentity, build_base_envelope};
pub use error::{BridgeError, BridgeResult};
pub use ids::{ChatId, ConversationId, EnvelopeId, ProviderId, UserId};
pub use message::{MessageInput, MessageKind, VoiceConfig};
pub use payload::JsonPayload;
pub use ports::{
    ChatMessage, ChatModelPort, ChatRequest, ChatRole, Embedding, EmbeddingModelPort,
    EmbeddingRequest, EnvelopePublisher, FailureReporter, FragmentStream, PartialFailure,
};
pub use state::{ConversationState, StreamPhase, default_state_for, resolve_state};
