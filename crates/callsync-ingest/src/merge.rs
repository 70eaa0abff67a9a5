//! Staging to main table reconciliation
//!
//! One MERGE statement per run, keyed on `ID`. Staging columns are typed by
//! autodetection, so values headed for STRING columns in the main table are
//! cast explicitly; every other column is copied as-is.

use crate::error::{IngestError, Result};
use crate::warehouse::{ColumnType, TableRef, TableSchema, Warehouse};
use callsync_common::types::ID_FIELD;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Characters of the statement kept in error reports
pub const STATEMENT_EXCERPT_CHARS: usize = 500;

/// Build the upsert of `staging` into `main` over `columns`.
///
/// Fails when `columns` lacks the ID column, since rows could not be matched.
pub fn build_merge_statement(
    main: &TableRef,
    staging: &TableRef,
    columns: &[String],
    schema: &TableSchema,
) -> Result<String> {
    if !columns.iter().any(|c| c == ID_FIELD) {
        return Err(IngestError::InvalidMerge(format!(
            "staging columns do not include {}",
            ID_FIELD
        )));
    }

    let mut updates = Vec::with_capacity(columns.len());
    let mut values = Vec::with_capacity(columns.len());

    for column in columns {
        let source = source_expr(column, schema);
        if column != ID_FIELD {
            updates.push(format!("T.{} = {}", column, source));
        }
        values.push(source);
    }

    let mut sql = format!(
        "MERGE {} T\nUSING {} S\nON T.{id} = S.{id}\n",
        main.quoted(),
        staging.quoted(),
        id = ID_FIELD
    );
    if !updates.is_empty() {
        sql.push_str(&format!(
            "WHEN MATCHED THEN\n  UPDATE SET {}\n",
            updates.join(", ")
        ));
    }
    sql.push_str(&format!(
        "WHEN NOT MATCHED THEN\n  INSERT ({}) VALUES ({})",
        columns.join(", "),
        values.join(", ")
    ));

    Ok(sql)
}

fn source_expr(column: &str, schema: &TableSchema) -> String {
    match schema.column_type(column) {
        Some(ColumnType::String) => format!("CAST(S.{} AS STRING)", column),
        _ => format!("S.{}", column),
    }
}

/// First `STATEMENT_EXCERPT_CHARS` characters of `sql`
pub fn statement_excerpt(sql: &str) -> String {
    sql.chars().take(STATEMENT_EXCERPT_CHARS).collect()
}

pub struct MergeExecutor {
    warehouse: Arc<dyn Warehouse>,
    main: TableRef,
    staging: TableRef,
}

impl MergeExecutor {
    pub fn new(warehouse: Arc<dyn Warehouse>, main: TableRef, staging: TableRef) -> Self {
        Self {
            warehouse,
            main,
            staging,
        }
    }

    /// Current schema of the main table, empty if it cannot be read
    async fn main_schema(&self) -> TableSchema {
        match self.warehouse.table_schema(&self.main).await {
            Ok(schema) => schema,
            Err(e) => {
                warn!(table = %self.main, error = %e, "Could not fetch main table schema, merging without casts");
                TableSchema::new()
            },
        }
    }

    /// Merge the staging table into the main table. Not retried.
    pub async fn merge(&self, columns: &[String]) -> Result<()> {
        let schema = self.main_schema().await;
        let sql = build_merge_statement(&self.main, &self.staging, columns, &schema)?;

        info!(
            main = %self.main,
            staging = %self.staging,
            columns = columns.len(),
            typed_columns = schema.len(),
            "Running merge"
        );

        match self.warehouse.execute(&sql).await {
            Ok(()) => {
                info!(main = %self.main, "Merge complete");
                Ok(())
            },
            Err(e) => {
                let excerpt = statement_excerpt(&sql);
                error!(error = %e, statement = %excerpt, "Merge failed");
                Err(IngestError::Merge {
                    message: e.to_string(),
                    statement_excerpt: excerpt,
                })
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn tables() -> (TableRef, TableRef) {
        (
            TableRef::new("proj", "crm", "Calls"),
            TableRef::new("proj", "crm", "Calls_Staging"),
        )
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_string_columns_cast_and_dates_pass_through() {
        let (main, staging) = tables();
        let schema: TableSchema = [("ID", "STRING"), ("PHONE", "STRING"), ("CALL_DATE", "DATE")]
            .into_iter()
            .collect();

        let sql =
            build_merge_statement(&main, &staging, &cols(&["CALL_DATE", "ID", "PHONE"]), &schema)
                .unwrap();

        assert_eq!(
            sql,
            "MERGE `proj.crm.Calls` T\n\
             USING `proj.crm.Calls_Staging` S\n\
             ON T.ID = S.ID\n\
             WHEN MATCHED THEN\n  \
             UPDATE SET T.CALL_DATE = S.CALL_DATE, T.PHONE = CAST(S.PHONE AS STRING)\n\
             WHEN NOT MATCHED THEN\n  \
             INSERT (CALL_DATE, ID, PHONE) VALUES (S.CALL_DATE, CAST(S.ID AS STRING), CAST(S.PHONE AS STRING))"
        );
    }

    #[test]
    fn test_schema_lookup_ignores_case() {
        let (main, staging) = tables();
        let schema: TableSchema = [("phone", "string")].into_iter().collect();
        let sql = build_merge_statement(&main, &staging, &cols(&["ID", "Phone"]), &schema).unwrap();
        assert!(sql.contains("T.Phone = CAST(S.Phone AS STRING)"));
    }

    #[test]
    fn test_empty_schema_copies_values() {
        let (main, staging) = tables();
        let sql =
            build_merge_statement(&main, &staging, &cols(&["ID", "PHONE"]), &TableSchema::new())
                .unwrap();
        assert!(!sql.contains("CAST"));
        assert!(sql.contains("UPDATE SET T.PHONE = S.PHONE"));
    }

    #[test]
    fn test_id_only_omits_matched_clause() {
        let (main, staging) = tables();
        let sql =
            build_merge_statement(&main, &staging, &cols(&["ID"]), &TableSchema::new()).unwrap();
        assert!(!sql.contains("WHEN MATCHED"));
        assert!(sql.ends_with("INSERT (ID) VALUES (S.ID)"));
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let (main, staging) = tables();
        let result =
            build_merge_statement(&main, &staging, &cols(&["PHONE"]), &TableSchema::new());
        assert!(matches!(result, Err(IngestError::InvalidMerge(_))));
    }

    #[test]
    fn test_statement_excerpt_is_char_bounded() {
        let sql = "é".repeat(600);
        let excerpt = statement_excerpt(&sql);
        assert_eq!(excerpt.chars().count(), STATEMENT_EXCERPT_CHARS);
        assert_eq!(statement_excerpt("short"), "short");
    }
}
