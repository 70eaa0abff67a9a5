//! Warehouse boundary
//!
//! The pipeline needs three things from the warehouse: the live column types
//! of a table, a way to run one SQL statement, and a truncating load of a
//! staged object into a table. [`BigQueryClient`] implements them over the
//! BigQuery REST API.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub mod bigquery;

pub use bigquery::BigQueryClient;

/// Fully qualified `project.dataset.table`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    pub fn new(project_id: &str, dataset_id: &str, table_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            dataset_id: dataset_id.to_string(),
            table_id: table_id.to_string(),
        }
    }

    /// Backtick-quoted form for use inside SQL
    pub fn quoted(&self) -> String {
        format!("`{}`", self)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// Declared type of a warehouse column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Timestamp,
    Date,
    Datetime,
    Other(std::string::String),
}

impl ColumnType {
    pub fn parse(type_name: &str) -> Self {
        match type_name.to_uppercase().as_str() {
            "STRING" => ColumnType::String,
            "TIMESTAMP" => ColumnType::Timestamp,
            "DATE" => ColumnType::Date,
            "DATETIME" => ColumnType::Datetime,
            other => ColumnType::Other(other.to_string()),
        }
    }
}

/// Column name to declared type, keyed case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    columns: HashMap<String, ColumnType>,
}

impl TableSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: &str, column_type: ColumnType) {
        self.columns.insert(column.to_uppercase(), column_type);
    }

    pub fn with(mut self, column: &str, column_type: ColumnType) -> Self {
        self.insert(column, column_type);
        self
    }

    pub fn column_type(&self, column: &str) -> Option<&ColumnType> {
        self.columns.get(&column.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for TableSchema {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut schema = TableSchema::new();
        for (name, type_name) in iter {
            schema.insert(name, ColumnType::parse(type_name));
        }
        schema
    }
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Current column types of `table`
    async fn table_schema(&self, table: &TableRef) -> Result<TableSchema>;

    /// Run one statement to completion
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Replace the contents of `table` with the NDJSON object at `source_uri`
    async fn load_truncate(&self, table: &TableRef, source_uri: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_ref_display() {
        let table = TableRef::new("data-proj", "Crm", "Calls");
        assert_eq!(table.to_string(), "data-proj.Crm.Calls");
        assert_eq!(table.quoted(), "`data-proj.Crm.Calls`");
    }

    #[test]
    fn test_column_type_parse() {
        assert_eq!(ColumnType::parse("string"), ColumnType::String);
        assert_eq!(ColumnType::parse("DATE"), ColumnType::Date);
        assert_eq!(ColumnType::parse("datetime"), ColumnType::Datetime);
        assert_eq!(ColumnType::parse("INT64"), ColumnType::Other("INT64".into()));
    }

    #[test]
    fn test_schema_lookup_is_case_insensitive() {
        let schema: TableSchema = [("Phone", "STRING"), ("call_date", "DATE")]
            .into_iter()
            .collect();
        assert_eq!(schema.column_type("PHONE"), Some(&ColumnType::String));
        assert_eq!(schema.column_type("CALL_DATE"), Some(&ColumnType::Date));
        assert_eq!(schema.column_type("missing"), None);
    }
}
