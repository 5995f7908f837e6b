//! Applies live change events from the channel to the local cache.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::FlagCache;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::decode_event;
use crate::metrics::DECODE_FAILURES;
use crate::metrics::EVENTS_APPLIED;
use crate::metrics::EVENTS_IGNORED;
use crate::metrics::MISSED_EVENTS;
use crate::BackoffPolicy;
use crate::Channel;
use crate::ChangeEvent;
use crate::Delivery;
use crate::Subscription;

/// What happened to one inbound payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Applied,
    Ignored,
    Malformed,
}

#[derive(Debug, Clone)]
pub struct Listener {
    cache: Arc<FlagCache>,
}

impl Listener {
    pub fn new(cache: Arc<FlagCache>) -> Self {
        Self { cache }
    }

    /// Decodes and applies one raw payload. Malformed payloads are logged
    /// and dropped; they are never retried.
    pub fn on_message(
        &self,
        raw: &[u8],
    ) -> MessageOutcome {
        match decode_event(raw) {
            Ok(event) => self.on_event(&event),
            Err(e) => {
                DECODE_FAILURES.inc();
                error!(
                    payload = %String::from_utf8_lossy(raw),
                    "Failed to parse flag change event message: {}", e
                );
                MessageOutcome::Malformed
            }
        }
    }

    pub fn on_event(
        &self,
        event: &ChangeEvent,
    ) -> MessageOutcome {
        debug!(%event, "Received flag change event");
        if self.cache.apply(event) {
            EVENTS_APPLIED.with_label_values(&[event.change_type.as_str()]).inc();
            MessageOutcome::Applied
        } else {
            EVENTS_IGNORED.inc();
            MessageOutcome::Ignored
        }
    }

    /// Subscription loop. Starts from `initial` when given, otherwise
    /// subscribes with `policy`. Drains deliveries into the cache and
    /// resubscribes whenever the subscription ends. Returns on shutdown or
    /// when `policy.max_retries` subscribe attempts all fail.
    pub async fn run(
        self,
        channel: Arc<dyn Channel>,
        initial: Option<Subscription>,
        policy: BackoffPolicy,
        mut shutdown: watch::Receiver<()>,
    ) {
        let mut pending = initial;
        loop {
            let subscription = match pending.take() {
                Some(subscription) => subscription,
                None => {
                    let subscribe = task_with_timeout_and_exponential_backoff(
                        || {
                            let channel = channel.clone();
                            async move { channel.subscribe().await }
                        },
                        policy,
                    );

                    tokio::select! {
                        result = subscribe => match result {
                            Ok(subscription) => subscription,
                            Err(e) => {
                                error!("Listener gave up subscribing: {:?}", e);
                                return;
                            }
                        },
                        _ = shutdown.changed() => {
                            info!("Listener shutting down before subscription");
                            return;
                        }
                    }
                }
            };

            info!(topic = %subscription.topic(), "Listener subscribed");
            if !self.drain(subscription, &mut shutdown).await {
                info!("Listener stopped");
                return;
            }
            warn!("Subscription ended, resubscribing");
        }
    }

    /// Returns `false` once shutdown was signalled
    async fn drain(
        &self,
        mut subscription: Subscription,
        shutdown: &mut watch::Receiver<()>,
    ) -> bool {
        loop {
            tokio::select! {
                delivery = subscription.next() => match delivery {
                    Some(Delivery::Message(payload)) => {
                        self.on_message(&payload);
                    }
                    Some(Delivery::Lagged(missed)) => {
                        MISSED_EVENTS.inc_by(missed);
                        warn!(missed, "Listener lagged behind the channel; a refresh will heal the gap");
                    }
                    None => return true,
                },
                _ = shutdown.changed() => return false,
            }
        }
    }

    /// Spawns [`Listener::run`] on the runtime
    pub fn spawn(
        self,
        channel: Arc<dyn Channel>,
        initial: Option<Subscription>,
        policy: BackoffPolicy,
        shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(channel, initial, policy, shutdown))
    }
}
