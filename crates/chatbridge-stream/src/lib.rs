//! Streaming aggregation of model fragments.
//!
//! A [`ChunkSequencer`] turns fragments into indexed messageChunk envelopes
//! one at a time; [`StreamAggregator`] drives a sequencer over a whole
//! fragment stream and collects the result. Empty fragments are dropped
//! without consuming an index. Exactly one completion envelope closes a
//! stream that ended normally.

use std::sync::Arc;

use chatbridge_protocol::{
    BridgeError, BridgeResult, ConversationState, Envelope, EnvelopeIdentity, FailureReporter,
    PartialFailure, STREAM_CLOSED_TEXT, StreamPhase, encode_progress_update, encode_stream_chunk,
    encode_text, resolve_state,
};
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, warn};

/// Running totals of a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamTotals {
    pub full_text: String,
    pub fragment_count: u32,
}

#[derive(Debug)]
pub struct ChunkSequencer {
    identity: EnvelopeIdentity,
    model: String,
    state_override: Option<ConversationState>,
    totals: StreamTotals,
}

impl ChunkSequencer {
    pub fn new(
        identity: EnvelopeIdentity,
        model: impl Into<String>,
        state_override: Option<ConversationState>,
    ) -> Self {
        Self {
            identity,
            model: model.into(),
            state_override,
            totals: StreamTotals::default(),
        }
    }

    /// Returns `None` for an empty fragment.
    pub fn push(&mut self, fragment: &str) -> Option<Envelope> {
        if fragment.is_empty() {
            return None;
        }
        let chunk_index = self.totals.fragment_count;
        self.totals.fragment_count += 1;
        self.totals.full_text.push_str(fragment);

        let state = resolve_state(self.state_override, StreamPhase::StreamingFragment);
        Some(encode_stream_chunk(
            self.identity.base(Some(state)),
            &self.model,
            fragment,
            chunk_index,
        ))
    }

    pub fn totals(&self) -> &StreamTotals {
        &self.totals
    }

    /// Close the stream: the completion envelope plus the final totals.
    pub fn finish(self) -> (Envelope, StreamTotals) {
        let state = resolve_state(self.state_override, StreamPhase::StreamingFinal);
        let completion = encode_stream_chunk(
            self.identity.base(Some(state)),
            &self.model,
            STREAM_CLOSED_TEXT,
            self.totals.fragment_count,
        );
        (completion, self.totals)
    }

    /// Give up on the stream without a completion envelope.
    pub fn abandon(self) -> StreamTotals {
        self.totals
    }
}

/// Result of aggregating one model stream.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub model: String,
    /// Progress envelope announced before the first fragment, if requested.
    pub progress: Option<Envelope>,
    /// Chunk envelopes in arrival order, followed by the completion envelope
    /// when the stream ended normally.
    pub chunks: Vec<Envelope>,
    pub full_text: String,
    pub fragment_count: u32,
    /// The stream ended normally and `chunks` ends with the completion
    /// envelope.
    pub completed: bool,
}

impl Aggregation {
    /// The completion envelope; `None` for a partial aggregation.
    pub fn completion(&self) -> Option<&Envelope> {
        if !self.completed {
            return None;
        }
        self.chunks.last()
    }

    /// Separate final-result envelope carrying the whole text.
    pub fn final_result(
        &self,
        identity: &EnvelopeIdentity,
        state_override: Option<ConversationState>,
        voice_enabled: bool,
    ) -> Envelope {
        final_result_envelope(identity, &self.full_text, state_override, voice_enabled)
    }
}

/// Text envelope carrying the whole response of a finished stream.
pub fn final_result_envelope(
    identity: &EnvelopeIdentity,
    full_text: &str,
    state_override: Option<ConversationState>,
    voice_enabled: bool,
) -> Envelope {
    let state = resolve_state(state_override, StreamPhase::StreamingFinal);
    encode_text(identity.base(Some(state)), full_text, voice_enabled)
}

/// A model stream failed mid-way. `partial` holds everything produced
/// before the failure.
#[derive(Debug, Error)]
#[error("model stream failed after {} fragments: {}", .partial.fragment_count, .source)]
pub struct AggregationFailure {
    pub partial: Aggregation,
    pub source: BridgeError,
}

/// Normalize any fragment-source failure to `UpstreamStream`.
pub fn into_upstream(error: BridgeError) -> BridgeError {
    match error {
        BridgeError::UpstreamStream(_) => error,
        other => BridgeError::UpstreamStream(other.to_string()),
    }
}

#[derive(Clone)]
pub struct StreamAggregator {
    identity: EnvelopeIdentity,
    model: String,
    state_override: Option<ConversationState>,
    progress_message: Option<String>,
    reporter: Option<Arc<dyn FailureReporter>>,
}

impl StreamAggregator {
    pub fn new(identity: EnvelopeIdentity, model: impl Into<String>) -> Self {
        Self {
            identity,
            model: model.into(),
            state_override: None,
            progress_message: None,
            reporter: None,
        }
    }

    /// Applies to every chunk, the completion envelope and the progress
    /// envelope.
    pub fn state_override(mut self, state: Option<ConversationState>) -> Self {
        self.state_override = state;
        self
    }

    pub fn progress_message(mut self, message: Option<String>) -> Self {
        self.progress_message = message.filter(|message| !message.is_empty());
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn FailureReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn identity(&self) -> &EnvelopeIdentity {
        &self.identity
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn sequencer(&self) -> ChunkSequencer {
        ChunkSequencer::new(self.identity.clone(), &self.model, self.state_override)
    }

    pub fn progress_envelope(&self) -> Option<Envelope> {
        self.progress_message.as_ref().map(|message| {
            let state = resolve_state(self.state_override, StreamPhase::OneShot);
            encode_progress_update(self.identity.base(Some(state)), message)
        })
    }

    /// Hand a mid-stream failure to the configured reporter.
    pub fn report(&self, fragments_received: u32, error: &BridgeError) {
        if let Some(reporter) = &self.reporter {
            reporter.report_partial_failure(&PartialFailure {
                model: &self.model,
                conversation_id: self.identity.conversation_id(),
                provider_id: self.identity.provider_id(),
                fragments_received,
                error,
            });
        }
    }

    pub async fn aggregate<S>(&self, fragments: S) -> Result<Aggregation, AggregationFailure>
    where
        S: Stream<Item = BridgeResult<String>>,
    {
        let mut fragments = std::pin::pin!(fragments);
        let progress = self.progress_envelope();
        let mut sequencer = self.sequencer();
        let mut chunks = Vec::new();

        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    if let Some(chunk) = sequencer.push(&fragment) {
                        chunks.push(chunk);
                    }
                }
                Err(error) => {
                    let error = into_upstream(error);
                    let totals = sequencer.abandon();
                    self.report(totals.fragment_count, &error);
                    return Err(AggregationFailure {
                        partial: Aggregation {
                            model: self.model.clone(),
                            progress,
                            chunks,
                            full_text: totals.full_text,
                            fragment_count: totals.fragment_count,
                            completed: false,
                        },
                        source: error,
                    });
                }
            }
        }

        let (completion, totals) = sequencer.finish();
        chunks.push(completion);
        debug!(
            model = %self.model,
            fragments = totals.fragment_count,
            "model stream aggregated"
        );

        Ok(Aggregation {
            model: self.model.clone(),
            progress,
            chunks,
            full_text: totals.full_text,
            fragment_count: totals.fragment_count,
            completed: true,
        })
    }
}

/// One-call form of [`StreamAggregator::aggregate`].
pub async fn aggregate<S>(
    identity: EnvelopeIdentity,
    fragments: S,
    model: &str,
    state_override: Option<ConversationState>,
    progress_message: Option<String>,
) -> Result<Aggregation, AggregationFailure>
where
    S: Stream<Item = BridgeResult<String>>,
{
    StreamAggregator::new(identity, model)
        .state_override(state_override)
        .progress_message(progress_message)
        .aggregate(fragments)
        .await
}

/// Reports partial stream failures as `tracing` warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFailureReporter;

impl FailureReporter for TracingFailureReporter {
    fn report_partial_failure(&self, failure: &PartialFailure<'_>) {
        warn!(
            model = failure.model,
            conversation_id = %failure.conversation_id,
            provider_id = %failure.provider_id,
            fragments_received = failure.fragments_received,
            error = %failure.error,
            "model stream failed mid-way"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chatbridge_protocol::{
        BridgeError, ConversationState, EnvelopeIdentity, FailureReporter, MessageKind,
        PartialFailure,
    };
    use futures_util::stream;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;

    fn identity() -> EnvelopeIdentity {
        EnvelopeIdentity::new("chat-1", "conv-1", "user-1", "wf:chat").unwrap()
    }

    fn fragments(items: &[&str]) -> impl Stream<Item = BridgeResult<String>> + use<> {
        let owned: Vec<BridgeResult<String>> =
            items.iter().map(|item| Ok((*item).to_owned())).collect();
        stream::iter(owned)
    }

    fn summary(envelope: &Envelope) -> (String, u32, ConversationState) {
        (
            envelope.chunk_text().unwrap_or_default().to_owned(),
            envelope.chunk_index().unwrap_or(u32::MAX),
            envelope.state(),
        )
    }

    #[derive(Default)]
    struct RecordingReporter {
        seen: Mutex<Vec<(String, u32)>>,
    }

    impl FailureReporter for RecordingReporter {
        fn report_partial_failure(&self, failure: &PartialFailure<'_>) {
            self.seen
                .lock()
                .push((failure.model.to_owned(), failure.fragments_received));
        }
    }

    #[tokio::test]
    async fn empty_fragments_are_dropped_without_consuming_an_index() -> Result<()> {
        let aggregation = aggregate(
            identity(),
            fragments(&["Hel", "lo", "", " world"]),
            "m1",
            None,
            None,
        )
        .await?;

        let summaries: Vec<_> = aggregation.chunks.iter().map(summary).collect();
        assert_eq!(
            summaries,
            vec![
                ("Hel".to_owned(), 0, ConversationState::Responding),
                ("lo".to_owned(), 1, ConversationState::Responding),
                (" world".to_owned(), 2, ConversationState::Responding),
                (" ".to_owned(), 3, ConversationState::Complete),
            ]
        );
        assert_eq!(aggregation.full_text, "Hello world");
        assert_eq!(aggregation.fragment_count, 3);
        assert!(aggregation.completed);
        assert!(aggregation.completion().is_some());
        Ok(())
    }

    #[tokio::test]
    async fn single_fragment_end_to_end() -> Result<()> {
        let aggregation = aggregate(identity(), fragments(&["A"]), "m1", None, None).await?;

        let values: Vec<_> = aggregation
            .chunks
            .iter()
            .map(|chunk| {
                let value = serde_json::to_value(chunk).unwrap();
                json!({
                    "model": value["payload"]["model"],
                    "text": value["payload"]["text"],
                    "chunkIndex": value["payload"]["chunkIndex"],
                    "state": value["state"],
                })
            })
            .collect();
        assert_eq!(
            values,
            vec![
                json!({"model": "m1", "text": "A", "chunkIndex": 0, "state": "responding"}),
                json!({"model": "m1", "text": " ", "chunkIndex": 1, "state": "complete"}),
            ]
        );
        assert_eq!(aggregation.full_text, "A");
        assert_eq!(aggregation.fragment_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn aggregation_is_deterministic() -> Result<()> {
        let input = ["The", " quick", "", " fox"];
        let first = aggregate(identity(), fragments(&input), "m1", None, None).await?;
        let second = aggregate(identity(), fragments(&input), "m1", None, None).await?;

        let indices = |a: &Aggregation| -> Vec<Option<u32>> {
            a.chunks.iter().map(|chunk| chunk.chunk_index()).collect()
        };
        assert_eq!(indices(&first), indices(&second));
        assert_eq!(first.full_text, second.full_text);
        Ok(())
    }

    #[tokio::test]
    async fn state_override_applies_to_every_chunk() -> Result<()> {
        let aggregation = aggregate(
            identity(),
            fragments(&["a", "b"]),
            "m1",
            Some(ConversationState::Thinking),
            None,
        )
        .await?;

        assert_eq!(aggregation.chunks.len(), 3);
        assert!(
            aggregation
                .chunks
                .iter()
                .all(|chunk| chunk.state() == ConversationState::Thinking)
        );
        Ok(())
    }

    #[tokio::test]
    async fn empty_stream_still_completes() -> Result<()> {
        let aggregation = aggregate(identity(), fragments(&[]), "m1", None, None).await?;
        assert_eq!(aggregation.chunks.len(), 1);
        assert_eq!(aggregation.chunks[0].chunk_index(), Some(0));
        assert_eq!(aggregation.full_text, "");
        Ok(())
    }

    #[tokio::test]
    async fn progress_message_is_returned_beside_the_chunks() -> Result<()> {
        let aggregation = aggregate(
            identity(),
            fragments(&["x"]),
            "m1",
            None,
            Some("Thinking…".to_owned()),
        )
        .await?;

        let progress = aggregation.progress.expect("progress envelope");
        assert!(matches!(
            progress.message(),
            MessageKind::ProgressUpdate { message } if message == "Thinking…"
        ));
        assert_eq!(progress.state(), ConversationState::Active);
        assert_eq!(aggregation.chunks.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_partial_chunks_and_reports() -> Result<()> {
        let reporter = Arc::new(RecordingReporter::default());
        let source = async_stream::stream! {
            yield Ok("one".to_owned());
            yield Ok("two".to_owned());
            yield Err(BridgeError::Provider("connection reset".to_owned()));
            yield Ok("never".to_owned());
        };

        let failure = StreamAggregator::new(identity(), "m1")
            .reporter(reporter.clone())
            .aggregate(source)
            .await
            .expect_err("stream should fail");

        assert_eq!(failure.partial.chunks.len(), 2);
        assert_eq!(failure.partial.full_text, "onetwo");
        assert!(!failure.partial.completed);
        assert!(failure.partial.completion().is_none());
        assert!(matches!(failure.source, BridgeError::UpstreamStream(ref msg) if msg.contains("connection reset")));
        assert_eq!(reporter.seen.lock().clone(), vec![("m1".to_owned(), 2)]);
        Ok(())
    }

    #[test]
    fn partial_aggregation_never_reports_a_completion() {
        let mut sequencer = ChunkSequencer::new(identity(), "m1", None);
        let chunk = sequencer.push("x").expect("chunk");
        let (closing, totals) = sequencer.finish();
        let partial = Aggregation {
            model: "m1".into(),
            progress: None,
            chunks: vec![chunk, closing],
            full_text: totals.full_text,
            fragment_count: totals.fragment_count,
            completed: false,
        };
        assert!(partial.completion().is_none());
    }

    #[test]
    fn sequencer_finish_uses_fragment_count_as_index() {
        let mut sequencer = ChunkSequencer::new(identity(), "m1", None);
        assert!(sequencer.push("").is_none());
        let first = sequencer.push("hi").expect("chunk");
        assert_eq!(first.chunk_index(), Some(0));
        let (completion, totals) = sequencer.finish();
        assert_eq!(completion.chunk_index(), Some(1));
        assert_eq!(completion.chunk_text(), Some(" "));
        assert_eq!(totals.full_text, "hi");
    }

    #[test]
    fn final_result_carries_full_text() {
        let aggregation = Aggregation {
            model: "m1".into(),
            progress: None,
            chunks: vec![],
            full_text: "Hello world".into(),
            fragment_count: 2,
            completed: true,
        };
        let envelope = aggregation.final_result(&identity(), None, false);
        assert_eq!(envelope.state(), ConversationState::Complete);
        assert!(matches!(
            envelope.message(),
            MessageKind::Text { content, .. } if content == "Hello world"
        ));
    }
}
