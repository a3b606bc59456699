//! Message payload variants.
//!
//! [`MessageKind`] is what ends up inside an envelope (`type` + `payload`).
//! [`MessageInput`] is what a producer asks for before encoding; it carries
//! unparsed JSON strings where the workflow parameter is free text.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Typed payload of an envelope. Serialized adjacently tagged:
/// `{"type": "<variant>", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum MessageKind {
    Text {
        content: String,
        #[serde(
            rename = "voiceConfig",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        voice_config: Option<VoiceConfig>,
    },
    JsonData {
        #[serde(rename = "_dataType")]
        data_type: String,
        items: Vec<Value>,
    },
    ImageResponse {
        url: String,
        alt: String,
    },
    ToolOutput {
        tool: String,
        result: Value,
    },
    ActionSuggestion {
        #[serde(rename = "type")]
        action_type: String,
        payload: Value,
    },
    ProgressUpdate {
        message: String,
    },
    /// Plain chunks carry only `text`; stream chunks add the model and index.
    MessageChunk {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(
            rename = "chunkIndex",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        chunk_index: Option<u32>,
    },
    /// Single-entry `{key: value}` mapping.
    Metadata(IndexMap<String, String>),
}

impl MessageKind {
    /// Wire discriminant.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::JsonData { .. } => "jsonData",
            Self::ImageResponse { .. } => "imageResponse",
            Self::ToolOutput { .. } => "toolOutput",
            Self::ActionSuggestion { .. } => "actionSuggestion",
            Self::ProgressUpdate { .. } => "progressUpdate",
            Self::MessageChunk { .. } => "messageChunk",
            Self::Metadata(_) => "metadata",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub enabled: bool,
}

/// Encoder request, one variant per message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MessageInput {
    Text {
        text: String,
        #[serde(default)]
        voice_enabled: bool,
    },
    JsonData {
        data: String,
        label: String,
    },
    ImageResponse {
        url: String,
        #[serde(default)]
        alt: Option<String>,
    },
    ToolOutput {
        tool: String,
        result: String,
    },
    ActionSuggestion {
        action_type: String,
        payload: String,
    },
    ProgressUpdate {
        message: String,
    },
    MessageChunk {
        text: String,
    },
    Metadata {
        key: String,
        value: String,
    },
}
