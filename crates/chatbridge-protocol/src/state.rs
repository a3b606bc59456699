//! Conversational lifecycle states.
//!
//! State transitions are producer-directed: the only defaults applied here are
//! the fallbacks used when a producer does not supply an explicit state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The conversational state an envelope carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    #[default]
    Active,
    Thinking,
    Responding,
    Waiting,
    Complete,
    Error,
    Cancelled,
}

impl ConversationState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Thinking => "thinking",
            Self::Responding => "responding",
            Self::Waiting => "waiting",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in an adapter invocation an envelope is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// One fragment of an in-flight model stream.
    StreamingFragment,
    /// The terminal marker of a model stream.
    StreamingFinal,
    /// A single envelope outside any stream.
    OneShot,
}

pub fn default_state_for(phase: StreamPhase) -> ConversationState {
    match phase {
        StreamPhase::StreamingFragment => ConversationState::Responding,
        StreamPhase::StreamingFinal => ConversationState::Complete,
        StreamPhase::OneShot => ConversationState::Active,
    }
}

/// An explicit override always wins over the phase default.
pub fn resolve_state(
    state_override: Option<ConversationState>,
    phase: StreamPhase,
) -> ConversationState {
    state_override.unwrap_or_else(|| default_state_for(phase))
}
