//! Full reconciliation against the authority's read API.
//!
//! A sync pulls every flag, filters by the allow-list and swaps the result
//! into the cache in one step. A failed pull leaves the cache exactly as it
//! was. Concurrent syncs queue behind one in-flight guard, so the last one to
//! finish wins.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::FlagCache;
use crate::constants::AUTHORITY_HEALTHY_BODY;
use crate::constants::FLAGS_HEALTH_PATH;
use crate::constants::FLAGS_PATH;
use crate::metrics::SYNC_DURATION_MS;
use crate::metrics::SYNC_TOTAL;
use crate::ConsumerConfig;
use crate::Result;
use crate::SyncError;

/// One row of the authority's flag list. Everything except `name` and
/// `enabled` is ignored; rows missing either are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFlag {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl RemoteFlag {
    pub fn new(
        name: impl Into<String>,
        enabled: bool,
    ) -> Self {
        Self {
            name: Some(name.into()),
            enabled: Some(enabled),
        }
    }
}

/// Read side of the authority, as seen by a consumer
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FlagSource: Send + Sync + 'static {
    /// Where the pull goes; used in logs and errors
    fn endpoint(&self) -> String;

    async fn fetch_all(&self) -> Result<Vec<RemoteFlag>>;

    /// Single flag lookup; `None` when the authority does not know the name
    async fn fetch_by_name(
        &self,
        name: &str,
    ) -> Result<Option<RemoteFlag>>;

    async fn is_healthy(&self) -> bool;
}

/// [`FlagSource`] over the authority's HTTP API
#[derive(Debug, Clone)]
pub struct HttpFlagSource {
    client: reqwest::Client,
    base_url: String,
    pull_timeout: Duration,
    health_timeout: Duration,
}

impl HttpFlagSource {
    pub fn new(config: &ConsumerConfig) -> Self {
        let base_url = config.authority_url.trim_end_matches('/').to_string();
        info!(%base_url, "Feature flag client initialized");
        Self {
            client: reqwest::Client::new(),
            base_url,
            pull_timeout: config.pull_timeout(),
            health_timeout: config.health_timeout(),
        }
    }

    fn pull_error(
        &self,
        url: &str,
        e: reqwest::Error,
    ) -> SyncError {
        if e.is_timeout() {
            SyncError::Timeout {
                url: url.to_string(),
                duration: self.pull_timeout,
            }
        } else {
            SyncError::from(e)
        }
    }
}

#[async_trait]
impl FlagSource for HttpFlagSource {
    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, FLAGS_PATH)
    }

    async fn fetch_all(&self) -> Result<Vec<RemoteFlag>> {
        let url = self.endpoint();
        let response = self
            .client
            .get(&url)
            .timeout(self.pull_timeout)
            .send()
            .await
            .map_err(|e| self.pull_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "Failed to sync flags");
            return Err(SyncError::Status(status.as_u16()).into());
        }

        let flags: Vec<RemoteFlag> = response.json().await.map_err(|e| self.pull_error(&url, e))?;
        Ok(flags)
    }

    async fn fetch_by_name(
        &self,
        name: &str,
    ) -> Result<Option<RemoteFlag>> {
        let url = format!("{}/name/{}", self.endpoint(), name);
        let response = self
            .client
            .get(&url)
            .timeout(self.pull_timeout)
            .send()
            .await
            .map_err(|e| self.pull_error(&url, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(%url, "Flag unknown to the authority");
            return Ok(None);
        }
        if !status.is_success() {
            warn!(%url, %status, "Failed to fetch flag");
            return Err(SyncError::Status(status.as_u16()).into());
        }

        let flag: RemoteFlag = response.json().await.map_err(|e| self.pull_error(&url, e))?;
        Ok(Some(flag))
    }

    async fn is_healthy(&self) -> bool {
        let url = format!("{}{}", self.base_url, FLAGS_HEALTH_PATH);
        let probe = async {
            let response = self
                .client
                .get(&url)
                .timeout(self.health_timeout)
                .send()
                .await?
                .error_for_status()?;
            response.text().await
        };

        match probe.await {
            Ok(body) => body.contains(AUTHORITY_HEALTHY_BODY),
            Err(e) => {
                warn!(%url, "Feature Flag Service health check failed: {}", e);
                false
            }
        }
    }
}

/// Outcome of a successful sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Rows the authority returned
    pub pulled: usize,
    /// Rows that landed in the cache after the allow-list filter
    pub applied: usize,
    /// Rows missing a name or enabled value
    pub skipped: usize,
}

pub struct Reconciler {
    cache: Arc<FlagCache>,
    source: Arc<dyn FlagSource>,
    pull_timeout: Duration,
    in_flight: Mutex<()>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("endpoint", &self.source.endpoint())
            .field("pull_timeout", &self.pull_timeout)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        cache: Arc<FlagCache>,
        source: Arc<dyn FlagSource>,
        pull_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            source,
            pull_timeout,
            in_flight: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &Arc<dyn FlagSource> {
        &self.source
    }

    /// Pulls every flag and atomically replaces the cache content.
    ///
    /// # Errors
    /// Any pull failure. The cache is untouched in that case.
    pub async fn full_sync(&self) -> Result<SyncReport> {
        let _guard = self.in_flight.lock().await;
        let timer = Instant::now();
        let endpoint = self.source.endpoint();
        info!(%endpoint, "Attempting to sync with Feature Flag Service");

        let pulled = match timeout(self.pull_timeout, self.source.fetch_all()).await {
            Ok(Ok(flags)) => flags,
            Ok(Err(e)) => return Err(self.sync_failed(e)),
            Err(_) => {
                return Err(self.sync_failed(
                    SyncError::Timeout {
                        url: endpoint,
                        duration: self.pull_timeout,
                    }
                    .into(),
                ))
            }
        };

        let total = pulled.len();
        let mut skipped = 0;
        let entries: Vec<(String, bool)> = pulled
            .into_iter()
            .filter_map(|flag| match (flag.name, flag.enabled) {
                (Some(name), Some(enabled)) => {
                    debug!(flag = %name, enabled, "Synced flag");
                    Some((name, enabled))
                }
                _ => {
                    skipped += 1;
                    None
                }
            })
            .collect();

        let applied = self.cache.replace_all(entries);
        SYNC_TOTAL.with_label_values(&["success"]).inc();
        SYNC_DURATION_MS.observe(timer.elapsed().as_millis() as f64);
        info!(
            pulled = total,
            applied, skipped, "Feature flag synchronization completed successfully"
        );

        Ok(SyncReport {
            pulled: total,
            applied,
            skipped,
        })
    }

    fn sync_failed(
        &self,
        e: crate::Error,
    ) -> crate::Error {
        SYNC_TOTAL.with_label_values(&["failure"]).inc();
        error!(
            "Failed to sync with Feature Flag Service, keeping current cache: {}",
            e
        );
        e
    }
}
