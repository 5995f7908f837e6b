use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DARK_MODE_FLAG;
use crate::constants::MAINTENANCE_MODE_FLAG;
use crate::Error;
use crate::Result;

/// Consumer-side cache, listener and reconciler settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConsumerConfig {
    /// Address the consumer status/refresh API binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Base URL of the authority read API
    #[serde(default = "default_authority_url")]
    pub authority_url: String,

    /// Flag names this consumer keeps; events for anything else are ignored
    #[serde(default = "default_allow_list")]
    pub allow_list: Vec<String>,

    /// Values seeded into the cache before the first event or sync
    #[serde(default = "default_defaults")]
    pub defaults: BTreeMap<String, bool>,

    /// Upper bound for the full flag pull (unit: milliseconds)
    #[serde(default = "default_pull_timeout_ms")]
    pub pull_timeout_ms: u64,

    /// Upper bound for the authority health probe (unit: milliseconds)
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,

    /// Run one reconciliation in the background at startup
    #[serde(default = "default_sync_on_startup")]
    pub sync_on_startup: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            authority_url: default_authority_url(),
            allow_list: default_allow_list(),
            defaults: default_defaults(),
            pull_timeout_ms: default_pull_timeout_ms(),
            health_timeout_ms: default_health_timeout_ms(),
            sync_on_startup: default_sync_on_startup(),
        }
    }
}

impl ConsumerConfig {
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if !(self.authority_url.starts_with("http://") || self.authority_url.starts_with("https://"))
        {
            return Err(Error::InvalidConfig(format!(
                "consumer.authority_url {} must be an http(s) URL",
                self.authority_url
            )));
        }
        if self.allow_list.iter().any(|name| name.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "consumer.allow_list cannot contain empty names".into(),
            ));
        }
        if self.pull_timeout_ms == 0 {
            return Err(Error::InvalidConfig("consumer.pull_timeout_ms must be > 0".into()));
        }
        if self.health_timeout_ms == 0 {
            return Err(Error::InvalidConfig("consumer.health_timeout_ms must be > 0".into()));
        }
        if let Some(name) = self.defaults.keys().find(|name| !self.allow_list.contains(name)) {
            tracing::warn!(
                flag = %name,
                "consumer.defaults names a flag outside allow_list; it will be ignored"
            );
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr.parse().map_err(|e| {
            Error::InvalidConfig(format!(
                "consumer.listen_addr {} is invalid: {}",
                self.listen_addr, e
            ))
        })
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_authority_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_allow_list() -> Vec<String> {
    vec![DARK_MODE_FLAG.to_string(), MAINTENANCE_MODE_FLAG.to_string()]
}

fn default_defaults() -> BTreeMap<String, bool> {
    BTreeMap::from([
        (DARK_MODE_FLAG.to_string(), false),
        (MAINTENANCE_MODE_FLAG.to_string(), false),
    ])
}

fn default_pull_timeout_ms() -> u64 {
    5000
}

fn default_health_timeout_ms() -> u64 {
    3000
}

fn default_sync_on_startup() -> bool {
    true
}
