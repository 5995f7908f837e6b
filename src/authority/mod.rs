//! Authority side of flag distribution.
//!
//! Owns the flag records, serves the operator API and emits one change event
//! per committed mutation.

pub mod http;
mod mem_store;
mod publisher;
mod service;
mod sled_store;
mod store;

pub use mem_store::*;
pub use publisher::*;
pub use service::*;
pub use sled_store::*;
pub use store::*;

#[cfg(test)]
mod service_test;

use std::sync::Arc;

use tracing::info;

use crate::AuthorityConfig;
use crate::Result;

/// Sled store when `db_path` is set, in-memory store otherwise
pub fn open_store(config: &AuthorityConfig) -> Result<Arc<dyn FlagStore>> {
    match &config.db_path {
        Some(path) => Ok(Arc::new(SledFlagStore::open(path)?)),
        None => {
            info!("No db_path configured, flags live in memory only");
            Ok(Arc::new(MemFlagStore::new()))
        }
    }
}
