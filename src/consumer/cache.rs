//! Consumer-local flag cache.
//!
//! Readers load an immutable map through [`ArcSwap`] and never wait. The two
//! writers (listener and reconciler) are serialised by a short mutex; each
//! write clones the current map, edits the copy and swaps it in, so a reader
//! sees either the whole old map or the whole new one.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::constants::DARK_MODE_FLAG;
use crate::constants::MAINTENANCE_MODE_FLAG;
use crate::ChangeEvent;
use crate::ConsumerConfig;

/// Counts reported next to the per-flag state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_flags: usize,
    pub enabled_flags: usize,
    pub disabled_flags: usize,
}

/// Diagnostic view of the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub dark_mode: bool,
    pub maintenance_mode: bool,
    pub flags: BTreeMap<String, bool>,
    pub cache_stats: CacheStats,
}

#[derive(Debug)]
pub struct FlagCache {
    allow_list: HashSet<String>,
    entries: ArcSwap<HashMap<String, bool>>,
    write_lock: Mutex<()>,
}

impl FlagCache {
    /// Empty cache that only ever holds names from `allow_list`
    pub fn new<I, S>(allow_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow_list: allow_list.into_iter().map(Into::into).collect(),
            entries: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Seeds initial values. Names outside the allow-list are dropped.
    pub fn with_defaults<I, S>(
        self,
        defaults: I,
    ) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let seeded: HashMap<String, bool> = defaults
            .into_iter()
            .map(|(name, enabled)| (name.into(), enabled))
            .filter(|(name, _)| self.allow_list.contains(name))
            .collect();
        self.entries.store(Arc::new(seeded));
        self
    }

    pub fn from_config(config: &ConsumerConfig) -> Self {
        let cache = Self::new(config.allow_list.iter().cloned())
            .with_defaults(config.defaults.iter().map(|(k, v)| (k.clone(), *v)));
        info!(
            allow_list = ?config.allow_list,
            seeded = cache.len(),
            "Initialized feature flag cache with default values"
        );
        cache
    }

    pub fn is_relevant(
        &self,
        name: &str,
    ) -> bool {
        self.allow_list.contains(name)
    }

    /// Stored value, or `false` for anything never seen
    pub fn is_enabled(
        &self,
        name: &str,
    ) -> bool {
        self.entries.load().get(name).copied().unwrap_or(false)
    }

    pub fn is_dark_mode(&self) -> bool {
        self.is_enabled(DARK_MODE_FLAG)
    }

    pub fn is_maintenance_mode(&self) -> bool {
        self.is_enabled(MAINTENANCE_MODE_FLAG)
    }

    /// Applies one change event. Returns `false` when the flag is not on the
    /// allow-list and the event was ignored.
    pub fn apply(
        &self,
        event: &ChangeEvent,
    ) -> bool {
        if !self.is_relevant(&event.flag_name) {
            debug!(flag = %event.flag_name, "Ignoring irrelevant flag update");
            return false;
        }

        if event.is_delete() {
            let removed = self.write(|map| map.remove(&event.flag_name).is_some());
            info!(flag = %event.flag_name, removed, "Removed flag from cache");
        } else {
            let enabled = event.enabled_or_default();
            self.write(|map| map.insert(event.flag_name.clone(), enabled) != Some(enabled));
            info!(flag = %event.flag_name, enabled, "Updated flag in cache");
        }
        true
    }

    /// Replaces the whole content in one swap. Returns how many entries
    /// survived the allow-list filter.
    pub fn replace_all<I>(
        &self,
        flags: I,
    ) -> usize
    where
        I: IntoIterator<Item = (String, bool)>,
    {
        let next: HashMap<String, bool> = flags
            .into_iter()
            .filter(|(name, _)| self.is_relevant(name))
            .collect();
        let applied = next.len();

        let _guard = self.write_lock.lock();
        self.entries.store(Arc::new(next));
        applied
    }

    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        self.entries.store(Arc::new(HashMap::new()));
        info!("Cleared feature flag cache");
    }

    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.entries.load().iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.load();
        let enabled_flags = entries.values().filter(|enabled| **enabled).count();
        CacheStats {
            total_flags: entries.len(),
            enabled_flags,
            disabled_flags: entries.len() - enabled_flags,
        }
    }

    pub fn status(&self) -> CacheStatus {
        let flags = self.snapshot();
        let enabled_flags = flags.values().filter(|enabled| **enabled).count();
        CacheStatus {
            dark_mode: flags.get(DARK_MODE_FLAG).copied().unwrap_or(false),
            maintenance_mode: flags.get(MAINTENANCE_MODE_FLAG).copied().unwrap_or(false),
            cache_stats: CacheStats {
                total_flags: flags.len(),
                enabled_flags,
                disabled_flags: flags.len() - enabled_flags,
            },
            flags,
        }
    }

    /// Clone-edit-swap under the writer lock. The swap is skipped when the
    /// edit reports no change.
    fn write<F>(
        &self,
        edit: F,
    ) -> bool
    where
        F: FnOnce(&mut HashMap<String, bool>) -> bool,
    {
        let _guard = self.write_lock.lock();
        let mut next = HashMap::clone(&self.entries.load());
        let changed = edit(&mut next);
        if changed {
            self.entries.store(Arc::new(next));
        }
        changed
    }
}
