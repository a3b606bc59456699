//! State update adapter.

use std::sync::Arc;

use chatbridge_bus::ChannelName;
use chatbridge_protocol::{
    BridgeResult, ConversationState, Envelope, EnvelopeIdentity, EnvelopePublisher,
    encode_metadata, encode_progress_update,
};
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct UpdateAdapter {
    publisher: Arc<dyn EnvelopePublisher>,
    channel: ChannelName,
}

impl UpdateAdapter {
    pub fn new(publisher: Arc<dyn EnvelopePublisher>, channel: ChannelName) -> Self {
        Self { publisher, channel }
    }

    /// Announce a conversational state; the message defaults to the state name.
    #[instrument(
        skip(self, identity, state, message),
        fields(channel = %self.channel, conversation_id = %identity.conversation_id(), state = %state)
    )]
    pub async fn publish_state(
        &self,
        identity: &EnvelopeIdentity,
        state: ConversationState,
        message: Option<String>,
    ) -> BridgeResult<Envelope> {
        let message = message.unwrap_or_else(|| state.as_str().to_owned());
        let envelope = encode_progress_update(identity.base(Some(state)), message);
        self.publisher
            .publish(self.channel.as_str(), &envelope)
            .await?;
        debug!(envelope_id = %envelope.id(), "state update published");
        Ok(envelope)
    }

    pub async fn publish_metadata(
        &self,
        identity: &EnvelopeIdentity,
        key: &str,
        value: &str,
    ) -> BridgeResult<Envelope> {
        let envelope = encode_metadata(identity.base(None), key, value);
        self.publisher
            .publish(self.channel.as_str(), &envelope)
            .await?;
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chatbridge_bus::{ChannelName, RecordingPublisher};
    use chatbridge_protocol::{ConversationState, EnvelopeIdentity, MessageKind};

    use super::UpdateAdapter;

    #[tokio::test]
    async fn state_update_defaults_message_to_state_name() -> Result<()> {
        let publisher = RecordingPublisher::default();
        let channel = ChannelName::qualified(Some("tenant"), "chat.updates")?;
        let adapter = UpdateAdapter::new(Arc::new(publisher.clone()), channel);
        let identity = EnvelopeIdentity::new("chat", "conv", "user", "wf:update")?;

        let envelope = adapter
            .publish_state(&identity, ConversationState::Waiting, None)
            .await?;

        assert_eq!(envelope.state(), ConversationState::Waiting);
        assert!(matches!(
            envelope.message(),
            MessageKind::ProgressUpdate { message } if message == "waiting"
        ));
        assert_eq!(publisher.published_on("tenant.chat.updates").len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn metadata_goes_to_update_channel() -> Result<()> {
        let publisher = RecordingPublisher::default();
        let channel = ChannelName::qualified(None, "chat.updates")?;
        let adapter = UpdateAdapter::new(Arc::new(publisher.clone()), channel);
        let identity = EnvelopeIdentity::new("chat", "conv", "user", "wf:update")?;

        adapter.publish_metadata(&identity, "model", "m1").await?;

        let published = publisher.take_published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].channel, "chat.updates");
        assert_eq!(published[0].envelope.type_name(), "metadata");
        Ok(())
    }
}
