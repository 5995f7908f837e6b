//! Wires one authority and one consumer around a shared change channel.
//!
//! Every component can be swapped before [`NodeBuilder::start`]; anything
//! left unset is built from [`FlagSyncConfig`].

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use super::Node;
use crate::authority;
use crate::authority::FlagService;
use crate::authority::FlagStore;
use crate::authority::Publisher;
use crate::consumer;
use crate::consumer::FlagConsumer;
use crate::consumer::FlagSource;
use crate::consumer::HttpFlagSource;
use crate::metrics;
use crate::BroadcastChannel;
use crate::Channel;
use crate::FlagSyncConfig;
use crate::Result;

pub struct NodeBuilder {
    pub(super) config: FlagSyncConfig,
    pub(super) channel: Option<Arc<dyn Channel>>,
    pub(super) store: Option<Arc<dyn FlagStore>>,
    pub(super) flag_source: Option<Arc<dyn FlagSource>>,
    pub(super) shutdown_signal: watch::Receiver<()>,
}

impl NodeBuilder {
    /// Loads configuration from defaults, `CONFIG_PATH` and the environment,
    /// then applies `config_path` on top when given.
    pub fn new(
        config_path: Option<&str>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<Self> {
        let mut config = FlagSyncConfig::new()?;
        if let Some(p) = config_path {
            info!("with_override_config from: {}", &p);
            config = config.with_override_config(p)?;
        }
        Ok(Self::init(config.validate()?, shutdown_signal))
    }

    pub fn init(
        config: FlagSyncConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            config,
            channel: None,
            store: None,
            flag_source: None,
            shutdown_signal,
        }
    }

    pub fn config(&self) -> &FlagSyncConfig {
        &self.config
    }

    pub fn channel(
        mut self,
        channel: Arc<dyn Channel>,
    ) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn store(
        mut self,
        store: Arc<dyn FlagStore>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    pub fn flag_source(
        mut self,
        flag_source: Arc<dyn FlagSource>,
    ) -> Self {
        self.flag_source = Some(flag_source);
        self
    }

    /// Binds both HTTP APIs and spawns every background task
    pub async fn start(mut self) -> Result<Node> {
        let config = self.config.clone();
        let shutdown = self.shutdown_signal.clone();
        let mut handles = Vec::new();

        let channel = self
            .channel
            .take()
            .unwrap_or_else(|| Arc::new(BroadcastChannel::new(&config.channel)));

        // authority
        let store = match self.store.take() {
            Some(store) => store,
            None => authority::open_store(&config.authority)?,
        };
        let (publisher, publisher_handle) = Publisher::start(channel.clone(), &config.authority, shutdown.clone());
        handles.push(publisher_handle);
        let service = Arc::new(FlagService::new(store, publisher));
        let (authority_addr, authority_server) =
            authority::http::bind(service.clone(), config.authority.socket_addr()?, shutdown.clone())?;
        handles.push(tokio::spawn(authority_server));

        // consumer
        let source = self
            .flag_source
            .take()
            .unwrap_or_else(|| Arc::new(HttpFlagSource::new(&config.consumer)));
        let consumer = Arc::new(FlagConsumer::with_source(&config.consumer, source));
        handles.extend(
            consumer
                .start(channel.clone(), config.retry.subscribe, shutdown.clone())
                .await,
        );
        let (consumer_addr, consumer_server) =
            consumer::http::bind(consumer.clone(), config.consumer.socket_addr()?, shutdown.clone())?;
        handles.push(tokio::spawn(consumer_server));

        if config.monitoring.prometheus_enabled {
            let (_, metrics_server) = metrics::bind(config.monitoring.prometheus_port, shutdown.clone())?;
            handles.push(tokio::spawn(metrics_server));
        }

        info!(%authority_addr, %consumer_addr, "flagsync node started");
        Ok(Node {
            authority_addr,
            consumer_addr,
            service,
            consumer,
            handles,
        })
    }
}
