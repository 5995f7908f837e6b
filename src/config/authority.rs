use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Authoritative flag service settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthorityConfig {
    /// Address the operator HTTP API binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Sled database directory. In-memory store when unset.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Upper bound for a single publish attempt (unit: milliseconds)
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,

    /// Pending events the publisher buffers before dropping new ones
    #[serde(default = "default_publish_queue_size")]
    pub publish_queue_size: usize,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            db_path: None,
            publish_timeout_ms: default_publish_timeout_ms(),
            publish_queue_size: default_publish_queue_size(),
        }
    }
}

impl AuthorityConfig {
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.publish_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "authority.publish_timeout_ms must be > 0".into(),
            ));
        }
        if self.publish_queue_size == 0 {
            return Err(Error::InvalidConfig(
                "authority.publish_queue_size must be > 0".into(),
            ));
        }
        if let Some(path) = &self.db_path {
            if path.as_os_str().is_empty() {
                return Err(Error::InvalidConfig("authority.db_path cannot be empty".into()));
            }
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr.parse().map_err(|e| {
            Error::InvalidConfig(format!(
                "authority.listen_addr {} is invalid: {}",
                self.listen_addr, e
            ))
        })
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_publish_timeout_ms() -> u64 {
    1000
}

fn default_publish_queue_size() -> usize {
    1024
}
