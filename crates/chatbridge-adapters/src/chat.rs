//! Streaming chat adapter.
//!
//! Opens a model stream for one trigger and publishes, in order: the optional
//! progress envelope, one chunk envelope per non-empty fragment, the
//! completion envelope and a final text envelope with the whole response.

use std::sync::Arc;

use chatbridge_bus::ChannelName;
use chatbridge_protocol::{
    BridgeError, BridgeResult, ChatMessage, ChatModelPort, ChatRequest, Envelope,
    EnvelopeIdentity, EnvelopePublisher, FailureReporter, ProviderId, encode_failure,
};
use chatbridge_stream::{
    StreamAggregator, StreamTotals, TracingFailureReporter, final_result_envelope, into_upstream,
};
use futures_util::StreamExt;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::ChatSettings;
use crate::trigger::InboundTrigger;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatOutcome {
    pub model: String,
    pub full_text: String,
    pub fragment_count: u32,
    /// Envelopes handed to the publisher, including the error envelope.
    pub published: usize,
    /// Set when the stream failed and continue-on-failure absorbed it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct ChatAdapter {
    model: Arc<dyn ChatModelPort>,
    publisher: Arc<dyn EnvelopePublisher>,
    channel: ChannelName,
    settings: ChatSettings,
    continue_on_fail: bool,
    voice_enabled: bool,
    reporter: Arc<dyn FailureReporter>,
}

impl ChatAdapter {
    pub fn new(
        model: Arc<dyn ChatModelPort>,
        publisher: Arc<dyn EnvelopePublisher>,
        channel: ChannelName,
        settings: ChatSettings,
    ) -> Self {
        Self {
            model,
            publisher,
            channel,
            settings,
            continue_on_fail: false,
            voice_enabled: false,
            reporter: Arc::new(TracingFailureReporter),
        }
    }

    pub fn continue_on_fail(mut self, continue_on_fail: bool) -> Self {
        self.continue_on_fail = continue_on_fail;
        self
    }

    pub fn voice_enabled(mut self, voice_enabled: bool) -> Self {
        self.voice_enabled = voice_enabled;
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn FailureReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn request_for(&self, prompt: &str) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = self
            .settings
            .system_prompt
            .as_deref()
            .filter(|system_prompt| !system_prompt.trim().is_empty())
        {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.push(ChatMessage::user(prompt));

        ChatRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        }
    }

    /// Validate the trigger and respond to its message. Validation failures
    /// are never absorbed by continue-on-failure.
    pub async fn handle(
        &self,
        trigger: &InboundTrigger,
        provider_id: ProviderId,
    ) -> BridgeResult<ChatOutcome> {
        let identity = trigger.identity(provider_id)?;
        let prompt = trigger.prompt()?;
        self.respond(&identity, prompt).await
    }

    #[instrument(
        skip(self, identity, prompt),
        fields(
            channel = %self.channel,
            conversation_id = %identity.conversation_id(),
            model = %self.settings.model
        )
    )]
    pub async fn respond(
        &self,
        identity: &EnvelopeIdentity,
        prompt: &str,
    ) -> BridgeResult<ChatOutcome> {
        let aggregator = StreamAggregator::new(identity.clone(), &self.settings.model)
            .state_override(self.settings.state_override)
            .progress_message(self.settings.progress_message.clone())
            .reporter(self.reporter.clone());
        let mut published = 0_usize;

        if let Some(progress) = aggregator.progress_envelope() {
            self.send(&progress).await?;
            published += 1;
        }

        let mut fragments = match self.model.stream_chat(self.request_for(prompt)).await {
            Ok(fragments) => fragments,
            Err(error) => {
                let error = into_upstream(error);
                aggregator.report(0, &error);
                return self
                    .fail(identity, error, StreamTotals::default(), published)
                    .await;
            }
        };

        let mut sequencer = aggregator.sequencer();
        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    if let Some(chunk) = sequencer.push(&fragment) {
                        self.send(&chunk).await?;
                        published += 1;
                    }
                }
                Err(error) => {
                    let error = into_upstream(error);
                    let totals = sequencer.abandon();
                    aggregator.report(totals.fragment_count, &error);
                    return self.fail(identity, error, totals, published).await;
                }
            }
        }

        let (completion, totals) = sequencer.finish();
        self.send(&completion).await?;
        let final_result = final_result_envelope(
            identity,
            &totals.full_text,
            self.settings.state_override,
            self.voice_enabled,
        );
        self.send(&final_result).await?;
        published += 2;

        info!(
            fragments = totals.fragment_count,
            published, "chat response streamed"
        );
        Ok(ChatOutcome {
            model: self.settings.model.clone(),
            full_text: totals.full_text,
            fragment_count: totals.fragment_count,
            published,
            error: None,
        })
    }

    async fn send(&self, envelope: &Envelope) -> BridgeResult<()> {
        self.publisher
            .publish(self.channel.as_str(), envelope)
            .await?;
        debug!(
            envelope_id = %envelope.id(),
            kind = envelope.type_name(),
            chunk_index = ?envelope.chunk_index(),
            "envelope published"
        );
        Ok(())
    }

    /// Chunks already published stand; no retraction is sent.
    async fn fail(
        &self,
        identity: &EnvelopeIdentity,
        error: BridgeError,
        totals: StreamTotals,
        published: usize,
    ) -> BridgeResult<ChatOutcome> {
        if !self.continue_on_fail {
            return Err(error);
        }

        warn!(%error, fragments = totals.fragment_count, "publishing error envelope for failed stream");
        let envelope = encode_failure(identity.base(None), error.to_string());
        self.send(&envelope).await?;

        Ok(ChatOutcome {
            model: self.settings.model.clone(),
            full_text: totals.full_text,
            fragment_count: totals.fragment_count,
            published: published + 1,
            error: Some(error.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chatbridge_bus::{ChannelName, RecordingPublisher};
    use chatbridge_protocol::{
        BridgeError, ChatRole, ConversationState, EnvelopeIdentity, MessageKind, ProviderId,
    };
    use serde_json::json;

    use super::ChatAdapter;
    use crate::config::ChatSettings;
    use crate::stub::ScriptedChatModel;
    use crate::trigger::InboundTrigger;

    fn identity() -> EnvelopeIdentity {
        EnvelopeIdentity::new("chat-1", "conv-1", "user-1", "wf:chat").unwrap()
    }

    fn settings() -> ChatSettings {
        ChatSettings {
            model: "m1".into(),
            ..ChatSettings::default()
        }
    }

    fn adapter(model: ScriptedChatModel, publisher: &RecordingPublisher) -> ChatAdapter {
        let channel = ChannelName::qualified(Some("tenant"), "chat.output").unwrap();
        ChatAdapter::new(
            Arc::new(model),
            Arc::new(publisher.clone()),
            channel,
            settings(),
        )
    }

    #[tokio::test]
    async fn publishes_chunks_completion_and_final_result_in_order() -> Result<()> {
        let publisher = RecordingPublisher::default();
        let adapter = adapter(ScriptedChatModel::new(["Hel", "lo", "", " world"]), &publisher);

        let outcome = adapter.respond(&identity(), "greet me").await?;
        assert_eq!(outcome.full_text, "Hello world");
        assert_eq!(outcome.fragment_count, 3);
        assert_eq!(outcome.published, 5);

        let published = publisher.published_on("tenant.chat.output");
        let shapes: Vec<_> = published
            .iter()
            .map(|envelope| (envelope.type_name(), envelope.chunk_index(), envelope.state()))
            .collect();
        assert_eq!(
            shapes,
            vec![
                ("messageChunk", Some(0), ConversationState::Responding),
                ("messageChunk", Some(1), ConversationState::Responding),
                ("messageChunk", Some(2), ConversationState::Responding),
                ("messageChunk", Some(3), ConversationState::Complete),
                ("text", None, ConversationState::Complete),
            ]
        );
        assert!(matches!(
            published[4].message(),
            MessageKind::Text { content, .. } if content == "Hello world"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn progress_message_is_published_first() -> Result<()> {
        let publisher = RecordingPublisher::default();
        let channel = ChannelName::qualified(None, "out")?;
        let adapter = ChatAdapter::new(
            Arc::new(ScriptedChatModel::new(["A"])),
            Arc::new(publisher.clone()),
            channel,
            ChatSettings {
                progress_message: Some("Thinking".into()),
                ..settings()
            },
        );

        adapter.respond(&identity(), "q").await?;
        let published = publisher.published_on("out");
        assert_eq!(published.len(), 4);
        assert_eq!(published[0].type_name(), "progressUpdate");
        Ok(())
    }

    #[tokio::test]
    async fn stream_failure_propagates_after_partial_publish() -> Result<()> {
        let publisher = RecordingPublisher::default();
        let adapter = adapter(
            ScriptedChatModel::new(["a", "b", "c"]).fail_after(2),
            &publisher,
        );

        let err = adapter.respond(&identity(), "q").await.unwrap_err();
        assert!(matches!(err, BridgeError::UpstreamStream(_)));
        assert_eq!(publisher.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn stream_failure_with_continue_on_fail_publishes_error_envelope() -> Result<()> {
        let publisher = RecordingPublisher::default();
        let adapter = adapter(
            ScriptedChatModel::new(["a", "b", "c"]).fail_after(1),
            &publisher,
        )
        .continue_on_fail(true);

        let outcome = adapter.respond(&identity(), "q").await?;
        assert_eq!(outcome.full_text, "a");
        assert_eq!(outcome.published, 2);
        assert!(outcome.error.is_some());

        let published = publisher.take_published();
        let last = &published.last().expect("error envelope").envelope;
        assert_eq!(last.state(), ConversationState::Error);
        assert!(last.error().is_some());
        Ok(())
    }

    #[tokio::test]
    async fn handle_rejects_trigger_without_chat_id() -> Result<()> {
        let publisher = RecordingPublisher::default();
        let adapter = adapter(ScriptedChatModel::new(["x"]), &publisher).continue_on_fail(true);
        let trigger = InboundTrigger::from_value(json!({
            "message": "hi",
            "sessionId": "s1",
            "userId": "u1"
        }))?;

        let err = adapter
            .handle(&trigger, ProviderId::from("wf:chat"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation { field: "chatId" }));
        assert!(publisher.is_empty());
        Ok(())
    }

    #[test]
    fn request_includes_system_prompt_when_set() {
        let publisher = RecordingPublisher::default();
        let channel = ChannelName::qualified(None, "out").unwrap();
        let adapter = ChatAdapter::new(
            Arc::new(ScriptedChatModel::new(["x"])),
            Arc::new(publisher),
            channel,
            ChatSettings {
                system_prompt: Some("Answer in French".into()),
                ..settings()
            },
        );

        let request = adapter.request_for("hello");
        assert_eq!(request.model, "m1");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, ChatRole::System);
        assert_eq!(request.messages[1].content, "hello");
    }
}
