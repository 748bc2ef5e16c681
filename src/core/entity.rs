//! Entity traits defining the core abstraction for all record types

use crate::core::field::{FieldKind, FieldValue};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status shared by every record
///
/// `Delete` is terminal: soft-deleted rows are hidden from default reads and
/// can never be moved back to another status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    #[default]
    Enable,
    Disable,
    Delete,
}

impl Status {
    /// Statuses visible to default list and find operations
    pub const LISTABLE: [Status; 2] = [Status::Enable, Status::Disable];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Enable => "ENABLE",
            Status::Disable => "DISABLE",
            Status::Delete => "DELETE",
        }
    }

    /// Case-insensitive parse
    pub fn parse(raw: &str) -> Option<Status> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ENABLE" => Some(Status::Enable),
            "DISABLE" => Some(Status::Disable),
            "DELETE" => Some(Status::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::parse(s).ok_or_else(|| format!("unknown status '{}'", s))
    }
}

impl From<Status> for FieldValue {
    fn from(status: Status) -> Self {
        FieldValue::String(status.as_str().to_string())
    }
}

impl crate::core::field::FieldType for Status {
    const KIND: FieldKind = FieldKind::Status;

    fn to_field(&self) -> FieldValue {
        FieldValue::from(*self)
    }

    fn from_field(value: FieldValue) -> Option<Self> {
        value.as_string().and_then(Status::parse)
    }
}

/// Base trait for all records in the system.
///
/// All records have:
/// - id: Unique identifier, assigned by the store on insert
/// - status: Lifecycle status
/// - updated_by: Actor of the last write
/// - created_at / updated_at: Timestamps maintained by the store
pub trait Entity: Clone + Send + Sync + 'static {
    /// Display name used in error messages (e.g. "Model")
    const ENTITY_NAME: &'static str;

    fn id(&self) -> Uuid;

    fn status(&self) -> Status;

    fn updated_by(&self) -> &str;

    fn created_at(&self) -> DateTime<Utc>;

    fn updated_at(&self) -> DateTime<Utc>;

    /// Check if the record has been soft-deleted
    fn is_deleted(&self) -> bool {
        self.status() == Status::Delete
    }

    fn is_active(&self) -> bool {
        self.status() == Status::Enable
    }
}

/// A column of a record's table
///
/// Implemented by the per-record column enums generated with
/// [`impl_record!`](crate::impl_record); `ALL` is the constant column table
/// that replaces any runtime reflection over record fields.
pub trait Column: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    const ALL: &'static [Self];
    const ID: Self;
    const STATUS: Self;
    const UPDATED_BY: Self;
    const UPDATED_AT: Self;
    const CREATED_AT: Self;

    /// Storage column name
    fn name(self) -> &'static str;

    fn kind(self) -> FieldKind;

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|column| column.name().eq_ignore_ascii_case(name))
    }
}

/// A record persisted in its own table
pub trait Record: Entity + Serialize + DeserializeOwned {
    type Column: Column;

    const TABLE: &'static str;

    /// Natural keys: each entry is a column set unique among non-deleted rows
    const UNIQUE: &'static [&'static [Self::Column]];

    /// Read one column
    fn value_of(&self, column: Self::Column) -> FieldValue;

    /// Overwrite one column; false when the value has the wrong type
    fn set_value(&mut self, column: Self::Column, value: FieldValue) -> bool;

    /// Name of the unique index covering `key`, as created by the migrations
    fn constraint_name(key: &[Self::Column]) -> String {
        let columns: Vec<&str> = key.iter().map(|column| column.name()).collect();
        format!("{}_{}_idx", Self::TABLE, columns.join("_"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(Status::parse("enable"), Some(Status::Enable));
        assert_eq!(Status::parse(" Disable "), Some(Status::Disable));
        assert_eq!(Status::parse("DELETE"), Some(Status::Delete));
        assert_eq!(Status::parse("gone"), None);
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_string(&Status::Disable).unwrap();
        assert_eq!(json, "\"DISABLE\"");
        let status: Status = serde_json::from_str("\"DELETE\"").unwrap();
        assert_eq!(status, Status::Delete);
    }

    #[test]
    fn test_listable_excludes_delete() {
        assert!(!Status::LISTABLE.contains(&Status::Delete));
    }
}
