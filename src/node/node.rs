use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;

use crate::authority::FlagService;
use crate::consumer::FlagConsumer;
use crate::Result;

/// A started node. Dropping it does not stop anything; fire the shutdown
/// signal and then [`Node::run`] returns once every task has wound down.
pub struct Node {
    pub(super) authority_addr: SocketAddr,
    pub(super) consumer_addr: SocketAddr,
    pub(super) service: Arc<FlagService>,
    pub(super) consumer: Arc<FlagConsumer>,
    pub(super) handles: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Node {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("authority_addr", &self.authority_addr)
            .field("consumer_addr", &self.consumer_addr)
            .field("tasks", &self.handles.len())
            .finish()
    }
}

impl Node {
    pub fn authority_addr(&self) -> SocketAddr {
        self.authority_addr
    }

    pub fn consumer_addr(&self) -> SocketAddr {
        self.consumer_addr
    }

    pub fn service(&self) -> &Arc<FlagService> {
        &self.service
    }

    pub fn consumer(&self) -> &Arc<FlagConsumer> {
        &self.consumer
    }

    /// Waits for every background task to finish. A task that panicked is
    /// logged and reported once all the others have been awaited too.
    pub async fn run(self) -> Result<()> {
        let mut first_failure = None;
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("node task failed: {:?}", e);
                first_failure.get_or_insert(e);
            }
        }
        info!("flagsync node stopped");
        match first_failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
