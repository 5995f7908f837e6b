//! Flag change events carried from the authority to every consumer.
//!
//! An event has no identity beyond its content and no sequence number.
//! Consumers rely on per-flag idempotent upsert/delete instead of ordering.

mod codec;
pub use codec::*;


use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Kind of mutation the authority committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Created => "CREATED",
            ChangeType::Updated => "UPDATED",
            ChangeType::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed flag mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub flag_name: String,

    /// Ignored for [`ChangeType::Deleted`]
    #[serde(default)]
    pub enabled: Option<bool>,

    pub change_type: ChangeType,
}

impl ChangeEvent {
    pub fn new(
        flag_name: impl Into<String>,
        enabled: Option<bool>,
        change_type: ChangeType,
    ) -> Self {
        Self {
            flag_name: flag_name.into(),
            enabled,
            change_type,
        }
    }

    pub fn created(
        flag_name: impl Into<String>,
        enabled: bool,
    ) -> Self {
        Self::new(flag_name, Some(enabled), ChangeType::Created)
    }

    pub fn updated(
        flag_name: impl Into<String>,
        enabled: bool,
    ) -> Self {
        Self::new(flag_name, Some(enabled), ChangeType::Updated)
    }

    /// `enabled` travels as `false` so older decoders never see a null
    pub fn deleted(flag_name: impl Into<String>) -> Self {
        Self::new(flag_name, Some(false), ChangeType::Deleted)
    }

    pub fn is_delete(&self) -> bool {
        self.change_type == ChangeType::Deleted
    }

    /// Value an upsert stores; absent means disabled
    pub fn enabled_or_default(&self) -> bool {
        self.enabled.unwrap_or(false)
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "{} - {:?} - {}",
            self.flag_name, self.enabled, self.change_type
        )
    }
}
