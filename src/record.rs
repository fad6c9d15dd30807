use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Layout shared by `Created Date` values, generated or typed in.
pub const DATE_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

const REMOTE_PREFIX: &str = "row-";
const LOCAL_PREFIX: &str = "new-";

/// A single scalar cell value.
///
/// Source data is mostly strings and numbers. Anything else coming off the
/// wire (booleans, nested objects) is kept as its JSON text so the field
/// still searches, sorts and exports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum FieldValue {
    Text(String),
    Number(Number),
    Absent,
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    /// Absent values and empty strings both count as "not filled in".
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Number(_) => false,
            FieldValue::Absent => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// String form used for search, filtering, mixed sorts and display.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Absent => String::new(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Absent => Ok(()),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => FieldValue::Text(s),
            Value::Number(n) => FieldValue::Number(n),
            Value::Null => FieldValue::Absent,
            other => FieldValue::Text(other.to_string()),
        }
    }
}

impl From<FieldValue> for Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Text(s) => Value::String(s),
            FieldValue::Number(n) => Value::Number(n),
            FieldValue::Absent => Value::Null,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n.into())
    }
}

/// Field name to value. Also used as a partial record for edits.
pub type Fields = BTreeMap<String, FieldValue>;

/// Engine-assigned identity of a row.
///
/// Remote rows get `row-<index>` from their position in the source payload,
/// local rows get `new-<millis>`. The prefixes never overlap.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    pub fn remote(index: usize) -> Self {
        RowId(format!("{}{}", REMOTE_PREFIX, index))
    }

    pub fn local(created_millis: i64) -> Self {
        RowId(format!("{}{}", LOCAL_PREFIX, created_millis))
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(s: &str) -> Self {
        RowId(s.to_string())
    }
}

impl From<String> for RowId {
    fn from(s: String) -> Self {
        RowId(s)
    }
}

/// One dataset row.
///
/// Persisted as a flat JSON object with the identity under `_internalId`,
/// next to the source fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "_internalId")]
    pub internal_id: RowId,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    pub fn new(internal_id: RowId, fields: Fields) -> Self {
        Record {
            internal_id,
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).filter(|v| !v.is_absent())
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Field-by-field overwrite, last write wins.
    pub fn merge(&mut self, partial: &Fields) {
        merge_fields(&mut self.fields, partial);
    }

    /// The dataset's own `id`, kept apart from `internal_id`.
    pub fn source_id(&self) -> Option<&FieldValue> {
        self.get("id")
    }
}

/// Turns raw source rows into records, numbering them by position.
pub fn assign_remote_ids(rows: Vec<Fields>) -> Vec<Record> {
    rows.into_iter()
        .enumerate()
        .map(|(idx, fields)| Record::new(RowId::remote(idx), fields))
        .collect()
}

/// Field-by-field overwrite of one partial record by another.
pub fn merge_fields(into: &mut Fields, partial: &Fields) {
    for (k, v) in partial {
        into.insert(k.clone(), v.clone());
    }
}
