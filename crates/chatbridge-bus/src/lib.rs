//! In-process implementations of the envelope publish port.
//!
//! The real bus client lives outside this workspace; these publishers back
//! tests, dry runs and the demo daemon.

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chatbridge_protocol::{BridgeError, BridgeResult, Envelope, EnvelopePublisher};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, instrument};

/// Fully qualified channel name: `<prefix>.<name>`, or `<name>` without a
/// prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn qualified(prefix: Option<&str>, name: &str) -> BridgeResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BridgeError::Config("channel name must not be empty".to_owned()));
        }
        let prefix = prefix.map(str::trim).filter(|prefix| !prefix.is_empty());
        Ok(match prefix {
            Some(prefix) => Self(format!("{}.{name}", prefix.trim_end_matches('.'))),
            None => Self(name.to_owned()),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A published envelope together with the channel it went to.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub channel: String,
    pub envelope: Envelope,
}

/// Keeps every published envelope in memory.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<Published>>>,
}

impl RecordingPublisher {
    pub fn take_published(&self) -> Vec<Published> {
        std::mem::take(&mut *self.published.lock())
    }

    pub fn published_on(&self, channel: &str) -> Vec<Envelope> {
        self.published
            .lock()
            .iter()
            .filter(|published| published.channel == channel)
            .map(|published| published.envelope.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.published.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.lock().is_empty()
    }
}

#[async_trait]
impl EnvelopePublisher for RecordingPublisher {
    async fn publish(&self, channel: &str, envelope: &Envelope) -> BridgeResult<()> {
        self.published.lock().push(Published {
            channel: channel.to_owned(),
            envelope: envelope.clone(),
        });
        Ok(())
    }
}

/// Fan-out hub: every subscriber sees every envelope published after it
/// subscribed. Publishing with no subscriber is not an error.
#[derive(Clone, Debug)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<Published>,
}

impl BroadcastPublisher {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.sender.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<Published> {
        BroadcastStream::new(self.sender.subscribe())
    }
}

#[async_trait]
impl EnvelopePublisher for BroadcastPublisher {
    #[instrument(skip(self, envelope), fields(envelope_id = %envelope.id(), kind = envelope.type_name()))]
    async fn publish(&self, channel: &str, envelope: &Envelope) -> BridgeResult<()> {
        let receivers = self
            .sender
            .send(Published {
                channel: channel.to_owned(),
                envelope: envelope.clone(),
            })
            .unwrap_or(0);
        debug!(receivers, "envelope broadcast");
        Ok(())
    }
}

/// Always fails; used to exercise the publish-error path.
#[derive(Debug, Clone, Default)]
pub struct RejectingPublisher {
    reason: String,
}

impl RejectingPublisher {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl EnvelopePublisher for RejectingPublisher {
    async fn publish(&self, channel: &str, _envelope: &Envelope) -> BridgeResult<()> {
        Err(BridgeError::Publish(anyhow!(
            "publish to {channel} rejected: {}",
            self.reason
        )))
    }
}

#[cfg(test)]
mod tests {
    use chatbridge_protocol::{EnvelopeIdentity, encode_text};
    use futures_util::StreamExt;

    use super::*;

    fn envelope(text: &str) -> Envelope {
        let identity = EnvelopeIdentity::new("chat", "conv", "user", "wf:node").unwrap();
        encode_text(identity.base(None), text, false)
    }

    #[test]
    fn channel_name_with_prefix() {
        let channel = ChannelName::qualified(Some("tenant-a."), "chat.output").unwrap();
        assert_eq!(channel.as_str(), "tenant-a.chat.output");
    }

    #[test]
    fn channel_name_without_prefix() {
        let channel = ChannelName::qualified(Some("  "), "updates").unwrap();
        assert_eq!(channel.to_string(), "updates");
        assert!(ChannelName::qualified(None, " ").is_err());
    }

    #[tokio::test]
    async fn recording_publisher_keeps_order() {
        let publisher = RecordingPublisher::default();
        publisher.publish("a", &envelope("1")).await.unwrap();
        publisher.publish("b", &envelope("2")).await.unwrap();
        publisher.publish("a", &envelope("3")).await.unwrap();

        assert_eq!(publisher.published_on("a").len(), 2);
        let all = publisher.take_published();
        let channels: Vec<_> = all.iter().map(|p| p.channel.as_str()).collect();
        assert_eq!(channels, vec!["a", "b", "a"]);
        assert!(publisher.is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let hub = BroadcastPublisher::new(16);
        let mut stream = hub.subscribe_stream();
        let sent = envelope("hello");
        hub.publish("out", &sent).await.unwrap();

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received.channel, "out");
        assert_eq!(received.envelope, sent);
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_ok() {
        let hub = BroadcastPublisher::new(4);
        assert!(hub.publish("out", &envelope("x")).await.is_ok());
    }

    #[tokio::test]
    async fn rejecting_publisher_surfaces_publish_error() {
        let publisher = RejectingPublisher::new("bus offline");
        let err = publisher.publish("out", &envelope("x")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Publish(_)));
        assert!(err.to_string().contains("bus offline"));
    }
}
