//! Workflow adapters between the message bus and model providers.
//!
//! [`BridgeBuilder`] wires the four adapters from one [`BridgeConfig`]:
//! output and chat envelopes go to the output channel, state updates to the
//! update channel, and embeddings are returned to the caller.

pub mod chat;
pub mod config;
pub mod embedding;
pub mod output;
pub mod stub;
pub mod trigger;
pub mod update;

use std::sync::Arc;

use chatbridge_protocol::{
    BridgeResult, ChatModelPort, ConversationState, Embedding, EmbeddingModelPort, Envelope,
    EnvelopeIdentity, EnvelopePublisher, FailureReporter, MessageInput, ProviderId,
};
use serde_json::Value;
use tracing::instrument;

pub use chat::{ChatAdapter, ChatOutcome};
pub use config::{BridgeConfig, ChatSettings, EmbeddingSettings};
pub use embedding::EmbeddingAdapter;
pub use output::{ItemOutcome, OutputAdapter};
pub use stub::{HashEmbeddingModel, ScriptedChatModel};
pub use trigger::InboundTrigger;
pub use update::UpdateAdapter;

#[derive(Clone)]
pub struct BridgeBuilder {
    config: BridgeConfig,
    publisher: Arc<dyn EnvelopePublisher>,
    chat_model: Arc<dyn ChatModelPort>,
    embedding_model: Arc<dyn EmbeddingModelPort>,
    reporter: Option<Arc<dyn FailureReporter>>,
}

impl BridgeBuilder {
    /// Starts with scripted stub providers; replace them with real ports.
    pub fn new(config: BridgeConfig, publisher: Arc<dyn EnvelopePublisher>) -> Self {
        Self {
            config,
            publisher,
            chat_model: Arc::new(ScriptedChatModel::default()),
            embedding_model: Arc::new(HashEmbeddingModel::default()),
            reporter: None,
        }
    }

    pub fn chat_model(mut self, chat_model: Arc<dyn ChatModelPort>) -> Self {
        self.chat_model = chat_model;
        self
    }

    pub fn embedding_model(mut self, embedding_model: Arc<dyn EmbeddingModelPort>) -> Self {
        self.embedding_model = embedding_model;
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn FailureReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn build(self) -> BridgeResult<Bridge> {
        let output_channel = self.config.output_channel()?;
        let update_channel = self.config.update_channel()?;

        let output = OutputAdapter::new(self.publisher.clone(), output_channel.clone())
            .continue_on_fail(self.config.continue_on_fail);
        let update = UpdateAdapter::new(self.publisher.clone(), update_channel);

        let mut chat = ChatAdapter::new(
            self.chat_model,
            self.publisher,
            output_channel,
            self.config.chat.clone(),
        )
        .continue_on_fail(self.config.continue_on_fail)
        .voice_enabled(self.config.voice_enabled);
        if let Some(reporter) = self.reporter {
            chat = chat.reporter(reporter);
        }

        let embedding = EmbeddingAdapter::new(self.embedding_model, self.config.embedding.clone());

        Ok(Bridge {
            provider_id: self.config.provider_id(),
            config: self.config,
            output,
            update,
            chat,
            embedding,
        })
    }
}

#[derive(Clone)]
pub struct Bridge {
    config: BridgeConfig,
    provider_id: ProviderId,
    output: OutputAdapter,
    update: UpdateAdapter,
    chat: ChatAdapter,
    embedding: EmbeddingAdapter,
}

impl Bridge {
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    pub fn output(&self) -> &OutputAdapter {
        &self.output
    }

    pub fn update(&self) -> &UpdateAdapter {
        &self.update
    }

    pub fn chat(&self) -> &ChatAdapter {
        &self.chat
    }

    pub fn embedding(&self) -> &EmbeddingAdapter {
        &self.embedding
    }

    pub fn identity_for(&self, trigger: &InboundTrigger) -> BridgeResult<EnvelopeIdentity> {
        trigger.identity(self.provider_id.clone())
    }

    /// Run the chat adapter for a raw trigger payload.
    #[instrument(skip(self, trigger), fields(provider_id = %self.provider_id))]
    pub async fn handle_chat_trigger(&self, trigger: Value) -> BridgeResult<ChatOutcome> {
        let trigger = InboundTrigger::from_value(trigger)?;
        self.chat.handle(&trigger, self.provider_id.clone()).await
    }

    pub async fn publish_items(
        &self,
        trigger: &InboundTrigger,
        items: Vec<MessageInput>,
        state: Option<ConversationState>,
    ) -> BridgeResult<Vec<ItemOutcome>> {
        let identity = self.identity_for(trigger)?;
        self.output.publish_items(&identity, items, state).await
    }

    pub async fn publish_state(
        &self,
        trigger: &InboundTrigger,
        state: ConversationState,
        message: Option<String>,
    ) -> BridgeResult<Envelope> {
        let identity = self.identity_for(trigger)?;
        self.update.publish_state(&identity, state, message).await
    }

    pub async fn embed_trigger(&self, trigger: &InboundTrigger) -> BridgeResult<Embedding> {
        self.embedding.embed_trigger(trigger).await
    }
}
