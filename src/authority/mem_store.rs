use std::collections::BTreeMap;
use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::Flag;
use super::FlagStore;
use super::NewFlag;
use crate::utils::time::get_now_as_millis;
use crate::Result;
use crate::StoreError;

#[derive(Debug, Default)]
struct Tables {
    last_id: u64,
    flags: BTreeMap<u64, Flag>,
    names: HashMap<String, u64>,
}

/// Volatile store used when no database path is configured
#[derive(Debug, Default)]
pub struct MemFlagStore {
    tables: RwLock<Tables>,
}

impl MemFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for MemFlagStore {
    fn list(&self) -> Result<Vec<Flag>> {
        Ok(self.tables.read().flags.values().cloned().collect())
    }

    fn get(
        &self,
        id: u64,
    ) -> Result<Option<Flag>> {
        Ok(self.tables.read().flags.get(&id).cloned())
    }

    fn get_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Flag>> {
        let tables = self.tables.read();
        Ok(tables.names.get(name).and_then(|id| tables.flags.get(id)).cloned())
    }

    fn exists_by_name(
        &self,
        name: &str,
    ) -> Result<bool> {
        Ok(self.tables.read().names.contains_key(name))
    }

    fn insert(
        &self,
        flag: NewFlag,
    ) -> Result<Flag> {
        let mut tables = self.tables.write();
        if tables.names.contains_key(&flag.name) {
            return Err(StoreError::Duplicate(flag.name).into());
        }

        tables.last_id += 1;
        let now = get_now_as_millis();
        let created = Flag {
            id: tables.last_id,
            name: flag.name,
            enabled: flag.enabled,
            description: flag.description,
            created_at: now,
            updated_at: now,
        };
        tables.names.insert(created.name.clone(), created.id);
        tables.flags.insert(created.id, created.clone());
        debug!(id = created.id, flag = %created.name, "inserted");
        Ok(created)
    }

    fn update(
        &self,
        mut flag: Flag,
    ) -> Result<Flag> {
        let mut tables = self.tables.write();
        let existing = match tables.flags.get(&flag.id) {
            Some(existing) => existing.clone(),
            None => return Err(StoreError::NotFound(flag.id).into()),
        };

        if existing.name != flag.name {
            if tables.names.contains_key(&flag.name) {
                return Err(StoreError::Duplicate(flag.name).into());
            }
            tables.names.remove(&existing.name);
            tables.names.insert(flag.name.clone(), flag.id);
        }

        flag.created_at = existing.created_at;
        flag.updated_at = get_now_as_millis().max(existing.updated_at);
        tables.flags.insert(flag.id, flag.clone());
        Ok(flag)
    }

    fn delete(
        &self,
        id: u64,
    ) -> Result<Flag> {
        let mut tables = self.tables.write();
        let removed = tables.flags.remove(&id).ok_or(StoreError::NotFound(id))?;
        tables.names.remove(&removed.name);
        Ok(removed)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.tables.read().flags.len())
    }

    fn count_enabled(&self) -> Result<usize> {
        Ok(self.tables.read().flags.values().filter(|f| f.enabled).count())
    }
}
