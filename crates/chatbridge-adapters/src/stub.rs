//! In-process model providers for dry runs and tests.

use async_stream::stream;
use async_trait::async_trait;
use chatbridge_protocol::{
    BridgeError, BridgeResult, ChatModelPort, ChatRequest, Embedding, EmbeddingModelPort,
    EmbeddingRequest, FragmentStream,
};

/// Replays a fixed list of fragments, optionally failing part way.
#[derive(Debug, Clone, Default)]
pub struct ScriptedChatModel {
    fragments: Vec<String>,
    fail_after: Option<usize>,
}

impl ScriptedChatModel {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            fail_after: None,
        }
    }

    /// Split `text` into word fragments. A run of whitespace stays attached to
    /// the word that follows it.
    pub fn from_text(text: &str) -> Self {
        let mut fragments = Vec::new();
        let mut current = String::new();
        for ch in text.chars() {
            if ch.is_whitespace() && !current.trim().is_empty() {
                fragments.push(std::mem::take(&mut current));
            }
            current.push(ch);
        }
        if !current.is_empty() {
            fragments.push(current);
        }
        Self::new(fragments)
    }

    /// Yield `count` fragments, then a provider error.
    pub fn fail_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }
}

#[async_trait]
impl ChatModelPort for ScriptedChatModel {
    async fn stream_chat(&self, request: ChatRequest) -> BridgeResult<FragmentStream> {
        if request.messages.is_empty() {
            return Err(BridgeError::Provider(
                "chat request has no messages".to_owned(),
            ));
        }

        let fragments = self.fragments.clone();
        let fail_after = self.fail_after;
        let model = request.model;
        Ok(Box::pin(stream! {
            let mut yielded = 0_usize;
            for fragment in fragments {
                if fail_after == Some(yielded) {
                    break;
                }
                yielded += 1;
                yield Ok(fragment);
            }
            if fail_after.is_some() {
                yield Err(BridgeError::Provider(format!(
                    "{model} stream interrupted after {yielded} fragments"
                )));
            }
        }))
    }
}

/// Deterministic bag-of-bytes embeddings, L2-normalized.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbeddingModel {
    dimensions: usize,
}

impl HashEmbeddingModel {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for (position, byte) in text.bytes().enumerate() {
            let bucket = (usize::from(byte) + position) % self.dimensions;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbeddingModel {
    fn default() -> Self {
        Self::new(16)
    }
}

#[async_trait]
impl EmbeddingModelPort for HashEmbeddingModel {
    async fn embed(&self, request: EmbeddingRequest) -> BridgeResult<Embedding> {
        Ok(Embedding {
            vectors: request
                .inputs
                .iter()
                .map(|input| self.vector_for(input))
                .collect(),
            model: request.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chatbridge_protocol::{
        BridgeError, ChatMessage, ChatModelPort, ChatRequest, EmbeddingModelPort, EmbeddingRequest,
    };
    use futures_util::StreamExt;

    use super::{HashEmbeddingModel, ScriptedChatModel};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "m1".into(),
            messages: vec![ChatMessage::user("hi")],
            temperature: None,
            max_tokens: None,
        }
    }

    #[test]
    fn from_text_keeps_leading_spaces() {
        let model = ScriptedChatModel::from_text("Hello brave  world");
        assert_eq!(model.fragments(), ["Hello", " brave", "  world"]);
        assert_eq!(model.fragments().concat(), "Hello brave  world");
    }

    #[tokio::test]
    async fn replays_fragments_in_order() -> Result<()> {
        let stream = ScriptedChatModel::new(["a", "b"]).stream_chat(request()).await?;
        let items: Vec<_> = stream.collect().await;
        let fragments: Vec<String> = items.into_iter().collect::<Result<_, _>>()?;
        assert_eq!(fragments, vec!["a", "b"]);
        Ok(())
    }

    #[tokio::test]
    async fn fails_after_requested_fragments() -> Result<()> {
        let stream = ScriptedChatModel::new(["a", "b", "c"])
            .fail_after(1)
            .stream_chat(request())
            .await?;
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Ok(ref fragment) if fragment == "a"));
        assert!(matches!(items[1], Err(BridgeError::Provider(_))));
        Ok(())
    }

    #[tokio::test]
    async fn hash_embeddings_are_deterministic_and_normalized() -> Result<()> {
        let model = HashEmbeddingModel::new(4);
        let request = EmbeddingRequest {
            model: "e1".into(),
            inputs: vec!["same".into(), "same".into(), "other".into()],
        };
        let embedding = model.embed(request).await?;
        assert_eq!(embedding.vectors.len(), 3);
        assert_eq!(embedding.vectors[0], embedding.vectors[1]);
        let norm: f32 = embedding.vectors[2].iter().map(|v| v * v).sum();
        assert!((norm - 1.0).abs() < 1e-5);
        Ok(())
    }
}
