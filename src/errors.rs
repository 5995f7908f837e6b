//! Flag Distribution Error Hierarchy
//!
//! Errors are grouped by the subsystem that raises them. Only [`StoreError`]
//! is allowed to reach an operator request on the authority; channel and
//! sync errors are contained by the task that observes them.

use std::net::SocketAddr;
use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration values that parsed but make no sense
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Authoritative flag store failures
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Change event transport failures
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Full reconciliation failures
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Local I/O failures (log files, listeners)
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// HTTP listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: warp::Error,
    },

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    RetryTaskFailed(String),

    #[error("{0}")]
    SignalSenderClosed(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Feature flag not found with id: {0}")]
    NotFound(u64),

    #[error("Feature flag not found with name: {0}")]
    NameNotFound(String),

    #[error("Feature flag already exists with name: {0}")]
    Duplicate(String),

    /// Rejected request payloads
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    Db(#[from] sled::Error),

    /// Serialization failures for persisted rows
    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error("Data corruption detected at {location}")]
    DataCorruption { location: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// No live transport behind the channel handle
    #[error("Channel closed: {0}")]
    Closed(String),

    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),

    /// Payload could not be encoded or decoded
    #[error(transparent)]
    Codec(#[from] serde_json::Error),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Pull from {url} timed out after {duration:?}")]
    Timeout { url: String, duration: Duration },

    /// Authority could not be reached at all
    #[error("Authority unreachable: {source}")]
    Unreachable {
        #[source]
        source: reqwest::Error,
    },

    /// Authority answered with a non-2xx status
    #[error("Authority returned status {0}")]
    Status(u16),

    /// Response body was not a flag list
    #[error("Failed to decode flag list: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return SyncError::Status(status.as_u16());
        }
        if e.is_decode() {
            return SyncError::Decode(e.to_string());
        }
        SyncError::Unreachable { source: e }
    }
}
