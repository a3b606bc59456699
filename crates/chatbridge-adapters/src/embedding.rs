//! Embedding adapter: turns trigger text into vectors through the model port.

use std::sync::Arc;

use chatbridge_protocol::{
    BridgeError, BridgeResult, Embedding, EmbeddingModelPort, EmbeddingRequest,
};
use tracing::{debug, instrument};

use crate::config::EmbeddingSettings;
use crate::trigger::InboundTrigger;

#[derive(Clone)]
pub struct EmbeddingAdapter {
    model: Arc<dyn EmbeddingModelPort>,
    settings: EmbeddingSettings,
}

impl EmbeddingAdapter {
    pub fn new(model: Arc<dyn EmbeddingModelPort>, settings: EmbeddingSettings) -> Self {
        Self { model, settings }
    }

    pub async fn embed_trigger(&self, trigger: &InboundTrigger) -> BridgeResult<Embedding> {
        let prompt = trigger.prompt()?;
        self.embed_texts(vec![prompt.to_owned()]).await
    }

    #[instrument(skip(self, inputs), fields(model = %self.settings.model, inputs = inputs.len()))]
    pub async fn embed_texts(&self, inputs: Vec<String>) -> BridgeResult<Embedding> {
        if inputs.is_empty() || inputs.iter().any(|input| input.trim().is_empty()) {
            return Err(BridgeError::Validation { field: "inputs" });
        }

        let embedding = self
            .model
            .embed(EmbeddingRequest {
                model: self.settings.model.clone(),
                inputs,
            })
            .await?;
        debug!(
            vectors = embedding.vectors.len(),
            dimensions = embedding.dimensions(),
            "embedding computed"
        );
        Ok(embedding)
    }
}
