//! Consumer side of flag distribution.
//!
//! A consumer keeps a local [`FlagCache`] fed by two writers: the
//! [`Listener`] applies live change events and the [`Reconciler`] replaces
//! the whole cache from a full pull. Reads never touch the network.

mod cache;
pub mod http;
mod listener;
mod reconciler;

pub use cache::*;
pub use listener::*;
pub use reconciler::*;

#[cfg(test)]
mod consumer_test;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use crate::utils::async_task::spawn_task;
use crate::BackoffPolicy;
use crate::Channel;
use crate::ConsumerConfig;
use crate::Result;

/// One consumer instance: cache plus the two tasks that keep it current
#[derive(Debug)]
pub struct FlagConsumer {
    cache: Arc<FlagCache>,
    reconciler: Arc<Reconciler>,
    sync_on_startup: bool,
}

impl FlagConsumer {
    /// Consumer pulling from the authority over HTTP
    pub fn new(config: &ConsumerConfig) -> Self {
        let source = Arc::new(HttpFlagSource::new(config));
        Self::with_source(config, source)
    }

    pub fn with_source(
        config: &ConsumerConfig,
        source: Arc<dyn FlagSource>,
    ) -> Self {
        let cache = Arc::new(FlagCache::from_config(config));
        let reconciler = Arc::new(Reconciler::new(cache.clone(), source, config.pull_timeout()));
        Self {
            cache,
            reconciler,
            sync_on_startup: config.sync_on_startup,
        }
    }

    pub fn cache(&self) -> &Arc<FlagCache> {
        &self.cache
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn is_enabled(
        &self,
        name: &str,
    ) -> bool {
        self.cache.is_enabled(name)
    }

    pub fn status(&self) -> CacheStatus {
        self.cache.status()
    }

    /// Operator-triggered full sync
    pub async fn refresh(&self) -> Result<SyncReport> {
        self.reconciler.full_sync().await
    }

    pub async fn authority_healthy(&self) -> bool {
        self.reconciler.source().is_healthy().await
    }

    /// Attaches the listener before the startup sync begins. Events
    /// published while the pull is in flight are therefore delivered.
    pub async fn start(
        &self,
        channel: Arc<dyn Channel>,
        policy: BackoffPolicy,
        shutdown: watch::Receiver<()>,
    ) -> Vec<JoinHandle<()>> {
        let initial = match channel.subscribe().await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                warn!("Initial subscription failed, listener will retry: {}", e);
                None
            }
        };
        let listener = Listener::new(self.cache.clone());
        let mut handles = vec![listener.spawn(channel, initial, policy, shutdown)];
        if self.sync_on_startup {
            let reconciler = self.reconciler.clone();
            info!("Starting feature flag synchronization on startup");
            spawn_task(
                "startup_sync",
                move || async move { reconciler.full_sync().await.map(|_| ()) },
                Some(&mut handles),
            );
        } else {
            info!("Startup sync disabled, serving defaults until the first event or refresh");
        }
        handles
    }
}
