//! Record types and reserved fields
//!
//! Every stored record is a JSON object carrying the reserved fields `id`,
//! `createdAt` and `updatedAt` next to the caller's own fields. [`Record`]
//! is the typed view: the reserved fields plus a flattened caller shape.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Untyped record shape: a JSON object
pub type Document = serde_json::Map<String, Value>;

pub const ID_FIELD: &str = "id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Fields owned by the store; callers cannot set them
pub const RESERVED_FIELDS: [&str; 3] = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD];

/// A stored record: store-managed metadata plus the caller's fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    /// Caller-defined fields
    #[serde(flatten)]
    pub data: T,

    /// Unique identifier within the collection
    pub id: String,

    /// Creation time, never changes
    #[serde(rename = "createdAt", with = "timestamp")]
    pub created_at: DateTime<Utc>,

    /// Last update time, refreshed by every matching update
    #[serde(rename = "updatedAt", with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl<T: DeserializeOwned> Record<T> {
    /// Decode a stored document into a typed record
    pub fn from_document(doc: Document) -> DbResult<Self> {
        Ok(serde_json::from_value(Value::Object(doc))?)
    }
}

impl<T: Serialize> Record<T> {
    /// Encode a typed record back into its stored form
    pub fn to_document(&self) -> DbResult<Document> {
        match serde_json::to_value(self)? {
            Value::Object(doc) => Ok(doc),
            other => Err(DbError::InvalidRecord(format!(
                "record serialized to {} instead of an object",
                json_type(&other)
            ))),
        }
    }
}

/// Serialize caller fields into a document, rejecting non-object shapes
pub(crate) fn fields_to_document<T: Serialize>(fields: &T) -> DbResult<Document> {
    match serde_json::to_value(fields)? {
        Value::Object(doc) => Ok(doc),
        other => Err(DbError::InvalidRecord(format!(
            "fields serialized to {} instead of an object",
            json_type(&other)
        ))),
    }
}

/// Remove reserved keys, returning the names that were present
pub(crate) fn strip_reserved(doc: &mut Document) -> Vec<&'static str> {
    RESERVED_FIELDS
        .iter()
        .copied()
        .filter(|field| doc.shift_remove(*field).is_some())
        .collect()
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Current time truncated to the millisecond precision stored on disk
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// ISO-8601 form used on disk, e.g. `2024-05-01T12:30:00.123Z`
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|at| at.with_timezone(&Utc))
}

/// Timestamp for a refreshed `updatedAt`
///
/// Strictly later than `previous` even when the clock has not moved a full
/// millisecond since the last write.
pub(crate) fn next_timestamp(previous: Option<&Value>) -> DateTime<Utc> {
    let at = now();
    match previous.and_then(Value::as_str).and_then(parse_timestamp) {
        Some(prev) if at <= prev => {
            debug!(previous = %format_timestamp(&prev), "next_timestamp: clock behind previous, bumping");
            prev + TimeDelta::milliseconds(1)
        }
        _ => at,
    }
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_timestamp(&s).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {s}")))
    }
}
