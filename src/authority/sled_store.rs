//! Durable flag store on sled.
//!
//! Two trees: `_flags` maps the big-endian id to a bincode-encoded [`Flag`],
//! `_flag_names` maps the name to the id. Both are written in one
//! transaction so the name index never disagrees with the rows.

use std::path::Path;

use sled::transaction::ConflictableTransactionError;
use sled::transaction::TransactionError;
use sled::Transactional;
use sled::Tree;
use tracing::debug;
use tracing::info;

use super::Flag;
use super::FlagStore;
use super::NewFlag;
use crate::constants::FLAGS_TREE;
use crate::constants::FLAG_NAMES_TREE;
use crate::utils::time::get_now_as_millis;
use crate::Result;
use crate::StoreError;

type TxResult<T> = std::result::Result<T, ConflictableTransactionError<StoreError>>;

pub struct SledFlagStore {
    db: sled::Db,
    flags: Tree,
    names: Tree,
}

impl std::fmt::Debug for SledFlagStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledFlagStore")
            .field("flags", &self.flags.len())
            .finish()
    }
}

#[inline]
fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn id_from_bytes(bytes: &[u8]) -> std::result::Result<u64, StoreError> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| StoreError::DataCorruption {
        location: format!("{FLAG_NAMES_TREE}: id of {} bytes", bytes.len()),
    })?;
    Ok(u64::from_be_bytes(raw))
}

fn decode_flag(bytes: &[u8]) -> std::result::Result<Flag, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

fn abort(e: StoreError) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(e)
}

fn unwrap_tx<T>(result: std::result::Result<T, TransactionError<StoreError>>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(e)) => Err(e.into()),
        Err(TransactionError::Storage(e)) => Err(StoreError::Db(e).into()),
    }
}

impl SledFlagStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::Config::default()
            .path(path)
            .use_compression(true)
            .open()
            .map_err(StoreError::Db)?;
        let store = Self::with_db(db)?;
        info!(path = %path.display(), flags = store.flags.len(), "opened flag database");
        Ok(store)
    }

    /// Store over an already opened database, e.g. a temporary one
    pub fn with_db(db: sled::Db) -> Result<Self> {
        let flags = db.open_tree(FLAGS_TREE).map_err(StoreError::Db)?;
        let names = db.open_tree(FLAG_NAMES_TREE).map_err(StoreError::Db)?;
        Ok(Self { db, flags, names })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(StoreError::Db)?;
        Ok(())
    }

    fn next_id(&self) -> Result<u64> {
        // sled ids start at zero
        Ok(self.db.generate_id().map_err(StoreError::Db)? + 1)
    }
}

impl FlagStore for SledFlagStore {
    fn list(&self) -> Result<Vec<Flag>> {
        let mut flags = Vec::with_capacity(self.flags.len());
        for row in self.flags.iter() {
            let (_, value) = row.map_err(StoreError::Db)?;
            flags.push(decode_flag(&value)?);
        }
        Ok(flags)
    }

    fn get(
        &self,
        id: u64,
    ) -> Result<Option<Flag>> {
        match self.flags.get(id_key(id)).map_err(StoreError::Db)? {
            Some(value) => Ok(Some(decode_flag(&value)?)),
            None => Ok(None),
        }
    }

    fn get_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Flag>> {
        let Some(raw_id) = self.names.get(name.as_bytes()).map_err(StoreError::Db)? else {
            return Ok(None);
        };
        let id = id_from_bytes(&raw_id)?;
        match self.get(id)? {
            Some(flag) => Ok(Some(flag)),
            None => Err(StoreError::DataCorruption {
                location: format!("{FLAG_NAMES_TREE}: {name} points at missing id {id}"),
            }
            .into()),
        }
    }

    fn exists_by_name(
        &self,
        name: &str,
    ) -> Result<bool> {
        Ok(self.names.contains_key(name.as_bytes()).map_err(StoreError::Db)?)
    }

    fn insert(
        &self,
        flag: NewFlag,
    ) -> Result<Flag> {
        let now = get_now_as_millis();
        let created = Flag {
            id: self.next_id()?,
            name: flag.name,
            enabled: flag.enabled,
            description: flag.description,
            created_at: now,
            updated_at: now,
        };
        let value = bincode::serialize(&created).map_err(StoreError::Bincode)?;
        let key = id_key(created.id);

        unwrap_tx((&self.flags, &self.names).transaction(|(flags, names)| -> TxResult<()> {
            if names.get(created.name.as_bytes())?.is_some() {
                return Err(abort(StoreError::Duplicate(created.name.clone())));
            }
            names.insert(created.name.as_bytes(), &key[..])?;
            flags.insert(&key[..], value.as_slice())?;
            Ok(())
        }))?;
        self.flush()?;

        debug!(id = created.id, flag = %created.name, "inserted");
        Ok(created)
    }

    fn update(
        &self,
        flag: Flag,
    ) -> Result<Flag> {
        let key = id_key(flag.id);
        let now = get_now_as_millis();

        let updated = unwrap_tx((&self.flags, &self.names).transaction(|(flags, names)| -> TxResult<Flag> {
            let existing = match flags.get(key)? {
                Some(value) => decode_flag(&value).map_err(abort)?,
                None => return Err(abort(StoreError::NotFound(flag.id))),
            };

            if existing.name != flag.name {
                if names.get(flag.name.as_bytes())?.is_some() {
                    return Err(abort(StoreError::Duplicate(flag.name.clone())));
                }
                names.remove(existing.name.as_bytes())?;
                names.insert(flag.name.as_bytes(), &key[..])?;
            }

            let mut updated = flag.clone();
            updated.created_at = existing.created_at;
            updated.updated_at = now.max(existing.updated_at);
            let value = bincode::serialize(&updated).map_err(|e| abort(StoreError::Bincode(e)))?;
            flags.insert(&key[..], value)?;
            Ok(updated)
        }))?;
        self.flush()?;
        Ok(updated)
    }

    fn delete(
        &self,
        id: u64,
    ) -> Result<Flag> {
        let key = id_key(id);
        let removed = unwrap_tx((&self.flags, &self.names).transaction(|(flags, names)| -> TxResult<Flag> {
            let removed = match flags.remove(&key[..])? {
                Some(value) => decode_flag(&value).map_err(abort)?,
                None => return Err(abort(StoreError::NotFound(id))),
            };
            names.remove(removed.name.as_bytes())?;
            Ok(removed)
        }))?;
        self.flush()?;
        Ok(removed)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.flags.len())
    }

    fn count_enabled(&self) -> Result<usize> {
        Ok(self.list()?.iter().filter(|f| f.enabled).count())
    }
}
