//! Message variant encoders.
//!
//! Pure functions: each consumes one [`EnvelopeBase`] and returns a fully
//! formed [`Envelope`]. Encoders that accept a JSON string fail with
//! [`BridgeError::MalformedPayload`] and produce no envelope.

use crate::envelope::{Envelope, EnvelopeBase};
use crate::error::BridgeResult;
use crate::message::{MessageInput, MessageKind, VoiceConfig};
use crate::payload::JsonPayload;
use indexmap::IndexMap;
use serde_json::Value;

/// Placeholder text of the completion chunk: no new content, stream closed.
pub const STREAM_CLOSED_TEXT: &str = " ";

pub fn encode_text(base: EnvelopeBase, text: impl Into<String>, voice_enabled: bool) -> Envelope {
    base.into_envelope(
        MessageKind::Text {
            content: text.into(),
            voice_config: voice_enabled.then_some(VoiceConfig { enabled: true }),
        },
        None,
    )
}

/// `raw` must parse as JSON. Single values are wrapped, arrays pass through.
pub fn encode_json_data(base: EnvelopeBase, raw: &str, label: &str) -> BridgeResult<Envelope> {
    let payload = JsonPayload::parse(label, raw)?;
    Ok(encode_json_data_value(base, payload, label))
}

pub fn encode_json_data_value(base: EnvelopeBase, payload: JsonPayload, label: &str) -> Envelope {
    base.into_envelope(
        MessageKind::JsonData {
            data_type: label.to_owned(),
            items: payload.into_items(),
        },
        None,
    )
}

pub fn encode_image_response(base: EnvelopeBase, url: &str, alt: Option<&str>) -> Envelope {
    base.into_envelope(
        MessageKind::ImageResponse {
            url: url.to_owned(),
            alt: alt.unwrap_or_default().to_owned(),
        },
        None,
    )
}

pub fn encode_tool_output(base: EnvelopeBase, tool: &str, result: &str) -> BridgeResult<Envelope> {
    let result = JsonPayload::parse("result", result)?.into_value();
    Ok(base.into_envelope(
        MessageKind::ToolOutput {
            tool: tool.to_owned(),
            result,
        },
        None,
    ))
}

pub fn encode_action_suggestion(
    base: EnvelopeBase,
    action_type: &str,
    payload: &str,
) -> BridgeResult<Envelope> {
    let payload = JsonPayload::parse("payload", payload)?.into_value();
    Ok(base.into_envelope(
        MessageKind::ActionSuggestion {
            action_type: action_type.to_owned(),
            payload,
        },
        None,
    ))
}

pub fn encode_progress_update(base: EnvelopeBase, message: impl Into<String>) -> Envelope {
    base.into_envelope(
        MessageKind::ProgressUpdate {
            message: message.into(),
        },
        None,
    )
}

pub fn encode_message_chunk(base: EnvelopeBase, text: impl Into<String>) -> Envelope {
    base.into_envelope(
        MessageKind::MessageChunk {
            text: text.into(),
            model: None,
            chunk_index: None,
        },
        None,
    )
}

/// Indexed chunk of a model stream.
pub fn encode_stream_chunk(
    base: EnvelopeBase,
    model: &str,
    text: impl Into<String>,
    chunk_index: u32,
) -> Envelope {
    base.into_envelope(
        MessageKind::MessageChunk {
            text: text.into(),
            model: Some(model.to_owned()),
            chunk_index: Some(chunk_index),
        },
        None,
    )
}

pub fn encode_metadata(base: EnvelopeBase, key: &str, value: &str) -> Envelope {
    let mut entries = IndexMap::with_capacity(1);
    entries.insert(key.to_owned(), value.to_owned());
    base.into_envelope(MessageKind::Metadata(entries), None)
}

/// Degraded envelope published in place of a failed item. The base state is
/// replaced with `error`.
pub fn encode_failure(base: EnvelopeBase, message: impl Into<String>) -> Envelope {
    let message = message.into();
    base.with_error_state().into_envelope(
        MessageKind::ProgressUpdate {
            message: message.clone(),
        },
        Some(message),
    )
}

/// Dispatch a [`MessageInput`] to its encoder.
pub fn encode(base: EnvelopeBase, input: MessageInput) -> BridgeResult<Envelope> {
    match input {
        MessageInput::Text {
            text,
            voice_enabled,
        } => Ok(encode_text(base, text, voice_enabled)),
        MessageInput::JsonData { data, label } => encode_json_data(base, &data, &label),
        MessageInput::ImageResponse { url, alt } => {
            Ok(encode_image_response(base, &url, alt.as_deref()))
        }
        MessageInput::ToolOutput { tool, result } => encode_tool_output(base, &tool, &result),
        MessageInput::ActionSuggestion {
            action_type,
            payload,
        } => encode_action_suggestion(base, &action_type, &payload),
        MessageInput::ProgressUpdate { message } => Ok(encode_progress_update(base, message)),
        MessageInput::MessageChunk { text } => Ok(encode_message_chunk(base, text)),
        MessageInput::Metadata { key, value } => Ok(encode_metadata(base, &key, &value)),
    }
}

/// Items of a jsonData envelope, if it is one.
pub fn json_items(envelope: &Envelope) -> Option<&[Value]> {
    match envelope.message() {
        MessageKind::JsonData { items, .. } => Some(items),
        _ => None,
    }
}
