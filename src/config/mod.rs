//! Configuration management for the flag authority and its consumers.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation

mod authority;
mod channel;
mod consumer;
mod monitoring;
mod retry;
pub use authority::*;
pub use channel::*;
pub use consumer::*;
pub use monitoring::*;
pub use retry::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Prefix for environment overrides, e.g. `FLAGSYNC__CONSUMER__PULL_TIMEOUT_MS`
pub(crate) const ENV_PREFIX: &str = "FLAGSYNC";

/// Main configuration container
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct FlagSyncConfig {
    /// Change event transport
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Authoritative flag service
    #[serde(default)]
    pub authority: AuthorityConfig,
    /// Consumer cache, listener and reconciler
    #[serde(default)]
    pub consumer: ConsumerConfig,
    /// Retry policies for distribution-path operations
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Metrics and log output
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Debug for FlagSyncConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FlagSyncConfig")
            .field("topic", &self.channel.topic)
            .field("authority", &self.authority.listen_addr)
            .field("consumer", &self.consumer.listen_addr)
            .finish_non_exhaustive()
    }
}

impl FlagSyncConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `FLAGSYNC__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so that `with_override_config()` can still be
    /// applied. Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/flagsync.toml");
    /// std::env::set_var("FLAGSYNC__CONSUMER__PULL_TIMEOUT_MS", "2000");
    /// let cfg = FlagSyncConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.channel.validate()?;
        self.authority.validate()?;
        self.consumer.validate()?;
        self.retry.validate()?;
        self.monitoring.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("consumer.allow_list")
}
