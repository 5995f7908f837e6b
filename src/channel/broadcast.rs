use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use tracing::info;
use tracing::trace;

use super::Channel;
use super::Delivery;
use super::Subscription;
use crate::ChannelConfig;
use crate::ChannelError;
use crate::Result;

/// In-process fan-out channel backed by `tokio::sync::broadcast`.
///
/// Each subscriber owns a ring of `capacity` payloads. A subscriber that
/// falls further behind loses the oldest payloads and is told so through
/// [`Delivery::Lagged`].
#[derive(Debug)]
pub struct BroadcastChannel {
    topic: String,
    sender: RwLock<Option<broadcast::Sender<Bytes>>>,
}

impl BroadcastChannel {
    pub fn new(config: &ChannelConfig) -> Self {
        let (sender, _) = broadcast::channel(config.capacity);
        info!(topic = %config.topic, capacity = config.capacity, "broadcast channel ready");
        Self {
            topic: config.topic.clone(),
            sender: RwLock::new(Some(sender)),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.read().as_ref().map(|s| s.receiver_count()).unwrap_or(0)
    }

    /// Tears the transport down. Open subscriptions end and later
    /// publish/subscribe calls fail with [`ChannelError::Closed`].
    pub fn close(&self) {
        if self.sender.write().take().is_some() {
            info!(topic = %self.topic, "broadcast channel closed");
        }
    }

    fn closed(&self) -> ChannelError {
        ChannelError::Closed(self.topic.clone())
    }
}

#[async_trait]
impl Channel for BroadcastChannel {
    async fn publish(
        &self,
        payload: Bytes,
    ) -> Result<usize> {
        let guard = self.sender.read();
        let sender = guard.as_ref().ok_or_else(|| self.closed())?;

        match sender.send(payload) {
            Ok(receivers) => {
                trace!(topic = %self.topic, receivers, "payload fanned out");
                Ok(receivers)
            }
            Err(_) => {
                debug!(topic = %self.topic, "no subscribers, payload dropped");
                Ok(0)
            }
        }
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let receiver = {
            let guard = self.sender.read();
            guard.as_ref().ok_or_else(|| self.closed())?.subscribe()
        };

        let stream = BroadcastStream::new(receiver).map(|item| match item {
            Ok(payload) => Delivery::Message(payload),
            Err(BroadcastStreamRecvError::Lagged(missed)) => Delivery::Lagged(missed),
        });

        debug!(topic = %self.topic, "new subscriber attached");
        Ok(Subscription::from_stream(self.topic.clone(), stream))
    }
}
