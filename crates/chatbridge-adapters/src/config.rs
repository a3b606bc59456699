//! Adapter configuration.
//!
//! Mirrors the parameters a workflow node exposes: channel names, model
//! choice, sampling limits and the continue-on-failure switch.

use std::path::Path;

use chatbridge_bus::ChannelName;
use chatbridge_protocol::{BridgeError, BridgeResult, ConversationState, ProviderId};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub workflow_id: String,
    pub node_id: String,
    pub channel_prefix: Option<String>,
    pub output_channel: String,
    pub update_channel: String,
    /// Publish a degraded error envelope and keep going instead of aborting.
    pub continue_on_fail: bool,
    pub voice_enabled: bool,
    pub chat: ChatSettings,
    pub embedding: EmbeddingSettings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            workflow_id: "workflow".to_owned(),
            node_id: "chat".to_owned(),
            channel_prefix: None,
            output_channel: "chat.output".to_owned(),
            update_channel: "chat.updates".to_owned(),
            continue_on_fail: false,
            voice_enabled: false,
            chat: ChatSettings::default(),
            embedding: EmbeddingSettings::default(),
        }
    }
}

impl BridgeConfig {
    /// Load from a JSON file; missing keys take their defaults.
    pub async fn load(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .await
            .map_err(|error| BridgeError::Config(format!("failed reading {path:?}: {error}")))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> BridgeResult<Self> {
        serde_json::from_str(raw)
            .map_err(|error| BridgeError::Config(format!("invalid bridge config: {error}")))
    }

    pub fn provider_id(&self) -> ProviderId {
        ProviderId::from_parts(&self.workflow_id, &self.node_id)
    }

    pub fn output_channel(&self) -> BridgeResult<ChannelName> {
        ChannelName::qualified(self.channel_prefix.as_deref(), &self.output_channel)
    }

    pub fn update_channel(&self) -> BridgeResult<ChannelName> {
        ChannelName::qualified(self.channel_prefix.as_deref(), &self.update_channel)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub model: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Replaces the responding/complete defaults on every streamed envelope.
    pub state_override: Option<ConversationState>,
    pub progress_message: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-latest".to_owned(),
            system_prompt: None,
            temperature: Some(0.7),
            max_tokens: Some(1024),
            state_override: None,
            progress_message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_owned(),
        }
    }
}
