//! Change event transport.
//!
//! A [`Channel`] is an at-most-once fan-out pipe bound to a single topic.
//! Every subscriber that is attached when a payload is published gets one
//! copy; nobody else ever sees it. Nothing is persisted or replayed, which is
//! why consumers pair a live subscription with full reconciliation.

mod broadcast;
pub use broadcast::*;

#[cfg(test)]
mod channel_test;

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use futures::StreamExt;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// What a subscription yields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// One raw payload
    Message(Bytes),
    /// The subscriber fell behind and this many payloads were dropped
    Lagged(u64),
}

/// Live attachment to a channel. Ends when the transport goes away.
pub struct Subscription {
    topic: String,
    inner: Pin<Box<dyn Stream<Item = Delivery> + Send>>,
}

impl Subscription {
    pub fn from_stream<S>(
        topic: impl Into<String>,
        stream: S,
    ) -> Self
    where
        S: Stream<Item = Delivery> + Send + 'static,
    {
        Self {
            topic: topic.into(),
            inner: Box::pin(stream),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next delivery, or `None` once the subscription is gone
    pub async fn next(&mut self) -> Option<Delivery> {
        self.inner.next().await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Fans `payload` out to current subscribers.
    ///
    /// Returns how many subscribers received it. Zero subscribers is not an
    /// error: the payload is simply gone.
    async fn publish(
        &self,
        payload: Bytes,
    ) -> Result<usize>;

    /// Attaches a new subscriber. Only payloads published afterwards arrive.
    async fn subscribe(&self) -> Result<Subscription>;
}
