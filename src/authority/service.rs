//! Flag CRUD with change emission.
//!
//! Every mutation goes to the store first. An event is emitted only after the
//! store returned success, and emission can never turn that success into a
//! failure.

use std::sync::Arc;

use tracing::info;
use tracing::warn;

use super::Flag;
use super::FlagRequest;
use super::FlagStats;
use super::FlagStore;
use super::Publisher;
use crate::Result;
use crate::StoreError;

pub struct FlagService {
    store: Arc<dyn FlagStore>,
    publisher: Publisher,
}

impl std::fmt::Debug for FlagService {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FlagService")
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl FlagService {
    pub fn new(
        store: Arc<dyn FlagStore>,
        publisher: Publisher,
    ) -> Self {
        Self { store, publisher }
    }

    pub fn list(&self) -> Result<Vec<Flag>> {
        self.store.list()
    }

    pub fn get(
        &self,
        id: u64,
    ) -> Result<Flag> {
        Ok(self.store.get(id)?.ok_or(StoreError::NotFound(id))?)
    }

    pub fn get_by_name(
        &self,
        name: &str,
    ) -> Result<Flag> {
        Ok(self
            .store
            .get_by_name(name)?
            .ok_or_else(|| StoreError::NameNotFound(name.to_string()))?)
    }

    pub fn create(
        &self,
        request: FlagRequest,
    ) -> Result<Flag> {
        let new_flag = request.validate()?;
        if self.store.exists_by_name(&new_flag.name)? {
            return Err(StoreError::Duplicate(new_flag.name).into());
        }

        let created = self.store.insert(new_flag)?;
        info!(id = created.id, flag = %created.name, enabled = created.enabled, "Created feature flag");
        self.publisher.created(&created.name, created.enabled);
        Ok(created)
    }

    /// Replaces name, enabled and description. A rename is announced as an
    /// update of the new name followed by a delete of the old one.
    pub fn update(
        &self,
        id: u64,
        request: FlagRequest,
    ) -> Result<Flag> {
        let existing = self.get(id)?;
        let changes = request.validate()?;
        let renamed = existing.name != changes.name;
        if renamed && self.store.exists_by_name(&changes.name)? {
            return Err(StoreError::Duplicate(changes.name).into());
        }

        let updated = self.store.update(Flag {
            name: changes.name,
            enabled: changes.enabled,
            description: changes.description,
            ..existing.clone()
        })?;
        info!(id, flag = %updated.name, enabled = updated.enabled, "Updated feature flag");

        self.publisher.updated(&updated.name, updated.enabled);
        if renamed {
            warn!(from = %existing.name, to = %updated.name, "Feature flag renamed");
            self.publisher.deleted(&existing.name);
        }
        Ok(updated)
    }

    pub fn delete(
        &self,
        id: u64,
    ) -> Result<Flag> {
        let removed = self.store.delete(id)?;
        info!(id, flag = %removed.name, "Deleted feature flag");
        self.publisher.deleted(&removed.name);
        Ok(removed)
    }

    pub fn toggle(
        &self,
        id: u64,
    ) -> Result<Flag> {
        let existing = self.get(id)?;
        let toggled = self.store.update(Flag {
            enabled: !existing.enabled,
            ..existing
        })?;
        info!(id, flag = %toggled.name, enabled = toggled.enabled, "Toggled feature flag");
        self.publisher.updated(&toggled.name, toggled.enabled);
        Ok(toggled)
    }

    pub fn stats(&self) -> Result<FlagStats> {
        let total_flags = self.store.count()?;
        let enabled_flags = self.store.count_enabled()?;
        Ok(FlagStats {
            total_flags,
            enabled_flags,
            disabled_flags: total_flags.saturating_sub(enabled_flags),
        })
    }
}
