//! Error types for the envelope contract.

use thiserror::Error;

/// Errors raised while building, encoding, aggregating or publishing envelopes.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("validation error: {field} must be a non-empty string")]
    Validation { field: &'static str },
    #[error("malformed payload in {field}: {reason}")]
    MalformedPayload { field: String, reason: String },
    #[error("upstream stream error: {0}")]
    UpstreamStream(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Raised by the publish collaborator and carried through unchanged.
    #[error(transparent)]
    Publish(anyhow::Error),
}

impl BridgeError {
    pub fn malformed(field: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedPayload {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the calling adapter may skip the failed item and continue.
    pub fn is_item_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedPayload { .. } | Self::UpstreamStream(_) | Self::Provider(_)
        )
    }
}

/// Convenience result type for envelope operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
