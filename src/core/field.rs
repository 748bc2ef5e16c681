//! Field value types and validation

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::OnceLock;
use uuid::Uuid;

/// A polymorphic column value
///
/// Lookup conditions, change sets and filter comparisons all carry their
/// operands as `FieldValue`s so the stores can bind them with the right type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    List(Vec<String>),
    Null,
}

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Uuid,
    Integer,
    Boolean,
    Timestamp,
    TextList,
    Status,
}

impl FieldKind {
    /// Whether `like` can be applied to the raw column without a cast
    pub fn is_textual(self) -> bool {
        matches!(self, FieldKind::Text | FieldKind::Status)
    }
}

impl FieldValue {
    /// Get the value as a string if possible
    pub fn as_string(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer if possible
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the value as a UUID if possible
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            FieldValue::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Parse a raw filter operand into a value of the given kind
    pub fn parse(kind: FieldKind, raw: &str) -> Result<FieldValue, String> {
        match kind {
            FieldKind::Text | FieldKind::TextList => Ok(FieldValue::String(raw.to_string())),
            FieldKind::Uuid => Uuid::parse_str(raw)
                .map(FieldValue::Uuid)
                .map_err(|_| format!("'{}' is not a valid UUID", raw)),
            FieldKind::Integer => raw
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| format!("'{}' is not a valid integer", raw)),
            FieldKind::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(FieldValue::Boolean(true)),
                "false" | "0" => Ok(FieldValue::Boolean(false)),
                _ => Err(format!("'{}' is not a valid boolean", raw)),
            },
            FieldKind::Timestamp => parse_timestamp(raw)
                .map(FieldValue::DateTime)
                .ok_or_else(|| format!("'{}' is not a valid RFC 3339 timestamp or date", raw)),
            FieldKind::Status => crate::core::entity::Status::parse(raw)
                .map(|status| FieldValue::String(status.as_str().to_string()))
                .ok_or_else(|| format!("'{}' is not a valid status", raw)),
        }
    }

    /// Text rendering used by `like` matching and exports
    pub fn render(&self) -> String {
        match self {
            FieldValue::String(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Uuid(u) => u.to_string(),
            FieldValue::DateTime(dt) => dt.to_rfc3339(),
            FieldValue::List(items) => items.join(","),
            FieldValue::Null => String::new(),
        }
    }

    /// Order two values of the same variant; `Null` sorts first
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::String(a), FieldValue::String(b)) => Some(a.cmp(b)),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => Some(a.cmp(b)),
            (FieldValue::Uuid(a), FieldValue::Uuid(b)) => Some(a.cmp(b)),
            (FieldValue::DateTime(a), FieldValue::DateTime(b)) => Some(a.cmp(b)),
            (FieldValue::List(a), FieldValue::List(b)) => Some(a.cmp(b)),
            (FieldValue::Null, FieldValue::Null) => Some(Ordering::Equal),
            (FieldValue::Null, _) => Some(Ordering::Less),
            (_, FieldValue::Null) => Some(Ordering::Greater),
            _ => None,
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Uuid(value)
    }
}

impl From<Option<Uuid>> for FieldValue {
    fn from(value: Option<Uuid>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Uuid)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::DateTime(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::List(value)
    }
}

/// Rust types that can be stored in a record column
pub trait FieldType: Sized {
    const KIND: FieldKind;

    fn to_field(&self) -> FieldValue;

    fn from_field(value: FieldValue) -> Option<Self>;
}

impl FieldType for String {
    const KIND: FieldKind = FieldKind::Text;

    fn to_field(&self) -> FieldValue {
        FieldValue::String(self.clone())
    }

    fn from_field(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::String(s) => Some(s),
            FieldValue::Null => Some(String::new()),
            _ => None,
        }
    }
}

impl FieldType for i64 {
    const KIND: FieldKind = FieldKind::Integer;

    fn to_field(&self) -> FieldValue {
        FieldValue::Integer(*self)
    }

    fn from_field(value: FieldValue) -> Option<Self> {
        value.as_integer()
    }
}

impl FieldType for bool {
    const KIND: FieldKind = FieldKind::Boolean;

    fn to_field(&self) -> FieldValue {
        FieldValue::Boolean(*self)
    }

    fn from_field(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Boolean(b) => Some(b),
            _ => None,
        }
    }
}

impl FieldType for Uuid {
    const KIND: FieldKind = FieldKind::Uuid;

    fn to_field(&self) -> FieldValue {
        FieldValue::Uuid(*self)
    }

    fn from_field(value: FieldValue) -> Option<Self> {
        value.as_uuid()
    }
}

impl FieldType for Option<Uuid> {
    const KIND: FieldKind = FieldKind::Uuid;

    fn to_field(&self) -> FieldValue {
        FieldValue::from(*self)
    }

    fn from_field(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Uuid(u) => Some(Some(u)),
            FieldValue::Null => Some(None),
            _ => None,
        }
    }
}

impl FieldType for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::Timestamp;

    fn to_field(&self) -> FieldValue {
        FieldValue::DateTime(*self)
    }

    fn from_field(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::DateTime(dt) => Some(dt),
            _ => None,
        }
    }
}

impl FieldType for Vec<String> {
    const KIND: FieldKind = FieldKind::TextList;

    fn to_field(&self) -> FieldValue {
        FieldValue::List(self.clone())
    }

    fn from_field(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::List(items) => Some(items),
            FieldValue::Null => Some(Vec::new()),
            _ => None,
        }
    }
}

/// Field format validators for domain identifiers
#[derive(Debug, Clone)]
pub enum FieldFormat {
    /// 12 lower-case hex digits, separators already removed
    MacAddress,
    /// `HH:MM~HH:MM`
    DownloadPeriod,
    Custom(Regex),
}

impl FieldFormat {
    /// Validate a field value against this format
    pub fn validate(&self, value: &FieldValue) -> bool {
        let Some(string_value) = value.as_string() else {
            return false;
        };

        match self {
            FieldFormat::MacAddress => Self::is_valid_mac(string_value),
            FieldFormat::DownloadPeriod => Self::is_valid_download_period(string_value),
            FieldFormat::Custom(regex) => regex.is_match(string_value),
        }
    }

    fn is_valid_mac(mac: &str) -> bool {
        static MAC_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
        cached_regex(&MAC_REGEX, r"^[0-9a-f]{12}$").is_some_and(|regex| regex.is_match(mac))
    }

    fn is_valid_download_period(period: &str) -> bool {
        static PERIOD_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
        cached_regex(
            &PERIOD_REGEX,
            r"^([01]\d|2[0-3]):([0-5]\d)~([01]\d|2[0-3]):([0-5]\d)$",
        )
        .is_some_and(|regex| regex.is_match(period))
    }
}

/// Compile a pattern once and keep it for the life of the process
pub(crate) fn cached_regex(
    cell: &'static OnceLock<Option<Regex>>,
    pattern: &str,
) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}
