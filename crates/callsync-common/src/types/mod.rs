//! Record types shared across the pipeline
//!
//! The CRM encodes "no value" as boolean `false` instead of `null`. That
//! convention is folded into [`FieldValue::Null`] while decoding, so nothing
//! downstream of the fetch boundary has to special-case booleans.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field code carrying the record identity
pub const ID_FIELD: &str = "ID";

/// A single CRM field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Plain string value
    Text(String),
    /// Numeric value, kept as the JSON number the API sent
    Number(serde_json::Number),
    /// Boolean `true` (a `false` decodes to [`FieldValue::Null`])
    Bool(bool),
    /// Multi-value field, empty and null elements removed
    List(Vec<String>),
    /// Missing value
    Null,
}

impl FieldValue {
    /// Collapse the value into a single optional string.
    ///
    /// Lists are joined with `", "`, nulls stay `None` and scalars pass
    /// through unchanged.
    pub fn to_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::List(items) => Some(
                items
                    .iter()
                    .filter(|item| !item.is_empty())
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            FieldValue::Null => None,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null | Value::Bool(false) => FieldValue::Null,
            Value::Bool(true) => FieldValue::Bool(true),
            Value::Number(n) => FieldValue::Number(n),
            Value::String(s) => FieldValue::Text(s),
            Value::Array(items) => {
                FieldValue::List(items.into_iter().filter_map(list_element).collect())
            },
            other @ Value::Object(_) => FieldValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(FieldValue::from)
    }
}

fn list_element(value: Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// One record exactly as the CRM returned it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Field value coerced to text (see [`FieldValue::to_text`])
    pub fn text(&self, field: &str) -> Option<String> {
        self.fields.get(field).and_then(FieldValue::to_text)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Builder-style variant of [`RawRecord::insert`]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    /// Record identity, `None` when the `ID` field is missing or blank
    pub fn id(&self) -> Option<String> {
        self.text(ID_FIELD)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A record after normalization: every column is a clean string or null
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CleanedRecord {
    fields: BTreeMap<String, Option<String>>,
}

impl CleanedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).and_then(|v| v.as_deref())
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Option<String>) {
        self.fields.insert(column.into(), value);
    }

    pub fn id(&self) -> Option<&str> {
        self.get(ID_FIELD)
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Add every column in `columns` that this record lacks, as null
    pub fn fill_missing<'a>(&mut self, columns: impl IntoIterator<Item = &'a String>) {
        for column in columns {
            self.fields.entry(column.clone()).or_insert(None);
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
