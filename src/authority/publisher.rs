//! Fire-and-forget emission of change events.
//!
//! Callers hand an event to [`Publisher`] after the store committed the
//! mutation. The handoff never blocks: the event goes into a bounded queue
//! drained by one worker, which keeps emission order. Every send is bounded
//! by the publish timeout and failures are logged, counted and dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::encode_event;
use crate::metrics::EVENTS_DROPPED;
use crate::metrics::EVENTS_PUBLISHED;
use crate::metrics::PUBLISH_FAILURES;
use crate::AuthorityConfig;
use crate::ChangeEvent;
use crate::ChangeType;
use crate::ChannelError;
use crate::Channel;

#[derive(Debug, Clone)]
pub struct Publisher {
    queue: mpsc::Sender<ChangeEvent>,
}

impl Publisher {
    /// Starts the publish worker and returns the handle used to emit
    pub fn start(
        channel: Arc<dyn Channel>,
        config: &AuthorityConfig,
        shutdown: watch::Receiver<()>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.publish_queue_size);
        let worker = PublishWorker {
            channel,
            publish_timeout: config.publish_timeout(),
            queue: rx,
        };
        let handle = tokio::spawn(worker.run(shutdown));
        (Self { queue: tx }, handle)
    }

    /// Queues one event. Never blocks and never fails the caller.
    pub fn emit(
        &self,
        flag_name: &str,
        enabled: Option<bool>,
        change_type: ChangeType,
    ) {
        if flag_name.is_empty() {
            warn!(%change_type, "Refusing to publish a change event without a flag name");
            return;
        }

        let event = ChangeEvent::new(flag_name, enabled, change_type);
        match self.queue.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                EVENTS_DROPPED.inc();
                warn!(%event, "Publish queue full, dropping flag change event");
            }
            Err(TrySendError::Closed(event)) => {
                EVENTS_DROPPED.inc();
                warn!(%event, "Publisher stopped, dropping flag change event");
            }
        }
    }

    pub fn created(
        &self,
        flag_name: &str,
        enabled: bool,
    ) {
        self.emit(flag_name, Some(enabled), ChangeType::Created);
    }

    pub fn updated(
        &self,
        flag_name: &str,
        enabled: bool,
    ) {
        self.emit(flag_name, Some(enabled), ChangeType::Updated);
    }

    pub fn deleted(
        &self,
        flag_name: &str,
    ) {
        self.emit(flag_name, Some(false), ChangeType::Deleted);
    }
}

struct PublishWorker {
    channel: Arc<dyn Channel>,
    publish_timeout: Duration,
    queue: mpsc::Receiver<ChangeEvent>,
}

impl PublishWorker {
    async fn run(
        mut self,
        mut shutdown: watch::Receiver<()>,
    ) {
        info!("Flag change publisher started");
        loop {
            tokio::select! {
                biased;
                event = self.queue.recv() => match event {
                    Some(event) => self.publish(event).await,
                    None => break,
                },
                _ = shutdown.changed() => {
                    self.queue.close();
                    // flush whatever was committed before shutdown
                    while let Some(event) = self.queue.recv().await {
                        self.publish(event).await;
                    }
                    break;
                }
            }
        }
        info!("Flag change publisher stopped");
    }

    async fn publish(
        &self,
        event: ChangeEvent,
    ) {
        let payload = match encode_event(&event) {
            Ok(payload) => payload,
            Err(e) => {
                PUBLISH_FAILURES.inc();
                error!(%event, "Failed to encode flag change event: {}", e);
                return;
            }
        };

        let result = match timeout(self.publish_timeout, self.channel.publish(payload)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout(self.publish_timeout).into()),
        };
        match result {
            Ok(receivers) => {
                EVENTS_PUBLISHED.with_label_values(&[event.change_type.as_str()]).inc();
                debug!(%event, receivers, "Published flag change event");
            }
            Err(e) => {
                PUBLISH_FAILURES.inc();
                error!(%event, "Failed to publish flag change event for flag {}: {}", event.flag_name, e);
            }
        }
    }
}
