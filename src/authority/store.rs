//! Authoritative flag records and the storage seam behind them.

#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;
use crate::StoreError;

/// One persisted feature flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub id: u64,
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
    /// Unix epoch milliseconds
    pub created_at: u64,
    /// Unix epoch milliseconds
    pub updated_at: u64,
}

/// Body of create and update requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
}

impl FlagRequest {
    pub fn new(
        name: impl Into<String>,
        enabled: bool,
    ) -> Self {
        Self {
            name: Some(name.into()),
            enabled: Some(enabled),
            description: None,
        }
    }

    pub fn with_description(
        mut self,
        description: impl Into<String>,
    ) -> Self {
        self.description = Some(description.into());
        self
    }

    /// A blank or missing name is rejected; a missing `enabled` means off
    pub fn validate(self) -> std::result::Result<NewFlag, StoreError> {
        let name = match self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(StoreError::Validation("Flag name is required".to_string())),
        };
        Ok(NewFlag {
            name,
            enabled: self.enabled.unwrap_or(false),
            description: self.description,
        })
    }
}

/// A validated request, ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFlag {
    pub name: String,
    pub enabled: bool,
    pub description: Option<String>,
}

/// Aggregate counts over the whole store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagStats {
    pub total_flags: usize,
    pub enabled_flags: usize,
    pub disabled_flags: usize,
}

/// Storage for flag records. Names are unique across the store.
///
/// Implementations assign ids and timestamps. Every method either fully
/// applies its change or leaves the store untouched.
#[cfg_attr(test, automock)]
pub trait FlagStore: Send + Sync + 'static {
    /// All flags ordered by id
    fn list(&self) -> Result<Vec<Flag>>;

    fn get(
        &self,
        id: u64,
    ) -> Result<Option<Flag>>;

    fn get_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Flag>>;

    fn exists_by_name(
        &self,
        name: &str,
    ) -> Result<bool>;

    /// Fails with [`StoreError::Duplicate`] when the name is taken
    fn insert(
        &self,
        flag: NewFlag,
    ) -> Result<Flag>;

    /// Overwrites name, enabled and description of `flag.id`. Keeps the
    /// original creation time and stamps a new update time.
    fn update(
        &self,
        flag: Flag,
    ) -> Result<Flag>;

    /// Removes and returns the flag
    fn delete(
        &self,
        id: u64,
    ) -> Result<Flag>;

    fn count(&self) -> Result<usize>;

    fn count_enabled(&self) -> Result<usize>;
}
