//! One-shot output adapter: encodes message inputs and publishes them.

use std::sync::Arc;

use chatbridge_bus::ChannelName;
use chatbridge_protocol::{
    BridgeResult, ConversationState, Envelope, EnvelopeId, EnvelopeIdentity, EnvelopePublisher,
    MessageInput, encode, encode_failure,
};
use serde::Serialize;
use tracing::{debug, instrument, warn};

/// What happened to one item of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Published { envelope_id: EnvelopeId },
    /// The item failed and an error envelope was published in its place.
    Degraded {
        envelope_id: EnvelopeId,
        error: String,
    },
}

#[derive(Clone)]
pub struct OutputAdapter {
    publisher: Arc<dyn EnvelopePublisher>,
    channel: ChannelName,
    continue_on_fail: bool,
}

impl OutputAdapter {
    pub fn new(publisher: Arc<dyn EnvelopePublisher>, channel: ChannelName) -> Self {
        Self {
            publisher,
            channel,
            continue_on_fail: false,
        }
    }

    pub fn continue_on_fail(mut self, continue_on_fail: bool) -> Self {
        self.continue_on_fail = continue_on_fail;
        self
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    #[instrument(
        skip(self, identity, input),
        fields(channel = %self.channel, conversation_id = %identity.conversation_id())
    )]
    pub async fn publish(
        &self,
        identity: &EnvelopeIdentity,
        input: MessageInput,
        state: Option<ConversationState>,
    ) -> BridgeResult<Envelope> {
        let envelope = encode(identity.base(state), input)?;
        self.publisher
            .publish(self.channel.as_str(), &envelope)
            .await?;
        debug!(envelope_id = %envelope.id(), kind = envelope.type_name(), "envelope published");
        Ok(envelope)
    }

    /// Publish items in order. A malformed item either aborts the batch or,
    /// with continue-on-failure, is replaced by an error envelope. Publish
    /// failures always abort.
    #[instrument(
        skip(self, identity, items),
        fields(channel = %self.channel, items = items.len())
    )]
    pub async fn publish_items(
        &self,
        identity: &EnvelopeIdentity,
        items: Vec<MessageInput>,
        state: Option<ConversationState>,
    ) -> BridgeResult<Vec<ItemOutcome>> {
        let mut outcomes = Vec::with_capacity(items.len());

        for (index, input) in items.into_iter().enumerate() {
            match encode(identity.base(state), input) {
                Ok(envelope) => {
                    self.publisher
                        .publish(self.channel.as_str(), &envelope)
                        .await?;
                    outcomes.push(ItemOutcome::Published {
                        envelope_id: envelope.id().clone(),
                    });
                }
                Err(error) if self.continue_on_fail && error.is_item_recoverable() => {
                    warn!(index, %error, "item failed, publishing error envelope");
                    let envelope = encode_failure(identity.base(None), error.to_string());
                    self.publisher
                        .publish(self.channel.as_str(), &envelope)
                        .await?;
                    outcomes.push(ItemOutcome::Degraded {
                        envelope_id: envelope.id().clone(),
                        error: error.to_string(),
                    });
                }
                Err(error) => return Err(error),
            }
        }

        debug!(published = outcomes.len(), "batch published");
        Ok(outcomes)
    }
}
