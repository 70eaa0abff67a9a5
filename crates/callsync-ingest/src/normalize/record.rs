//! Per-record cleaning
//!
//! Applies the normalization functions column by column, driven by
//! [`CleaningConfig`] so field codes never appear in the transforms.

use super::date::{fix_date_format, is_date_sentinel, normalize_date_column};
use super::phone::best_phone;
use super::source::classify_source;
use crate::config::CleaningConfig;
use crate::reference::ReferenceMaps;
use callsync_common::{CleanedRecord, RawRecord};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Cleaned records sharing one set of columns
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanedBatch {
    pub records: Vec<CleanedRecord>,
    /// Sorted union of every record's columns
    pub columns: Vec<String>,
}

impl CleanedBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Custom creation date unless it is blank, else the system one
pub fn creation_date(custom: Option<&str>, system: Option<&str>) -> Option<String> {
    match custom {
        Some(value) if !is_date_sentinel(value) => Some(value.to_string()),
        _ => system.map(str::to_string),
    }
}

pub struct RecordCleaner<'a> {
    config: &'a CleaningConfig,
    maps: &'a ReferenceMaps,
}

impl<'a> RecordCleaner<'a> {
    pub fn new(config: &'a CleaningConfig, maps: &'a ReferenceMaps) -> Self {
        Self { config, maps }
    }

    /// Row-wise transforms for one record
    pub fn clean_record(&self, raw: &RawRecord) -> CleanedRecord {
        let config = self.config;
        let mut record = CleanedRecord::new();

        for (field, value) in raw.fields() {
            record.set(field.clone(), value.to_text());
        }

        for rule in &config.enrichment {
            if !raw.contains(&rule.source_field) {
                continue;
            }
            let label = record.get(&rule.source_field).map(|code| {
                self.maps
                    .lookup(rule.map, code)
                    .unwrap_or(code)
                    .to_string()
            });
            record.set(rule.target_column.clone(), label);
        }

        let phone = best_phone(
            record.get(&config.phone_field),
            record.get(&config.title_field),
        );
        record.set(config.phone_column.clone(), phone);

        let source_field = if raw.contains(&config.source_field) {
            &config.source_field
        } else {
            &config.source_alt_field
        };
        let channel = classify_source(
            record.get(source_field),
            record.get(&config.contact_source_field),
        );
        record.set(config.source_column.clone(), Some(channel));

        let created = creation_date(
            record.get(&config.creation_field),
            record.get(&config.system_created_field),
        );
        record.set(
            config.creation_column.clone(),
            fix_date_format(created.as_deref()),
        );

        for field in &config.date_fields {
            if record.has_column(field) {
                let fixed = fix_date_format(record.get(field));
                record.set(field.clone(), fixed);
            }
        }

        record
    }

    /// Clean every record, align columns, then run the column-wise date pass
    pub fn clean_batch(&self, raws: &[RawRecord]) -> CleanedBatch {
        let mut records: Vec<CleanedRecord> =
            raws.iter().map(|raw| self.clean_record(raw)).collect();

        let columns: Vec<String> = records
            .iter()
            .flat_map(|r| r.columns().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        for record in &mut records {
            record.fill_missing(&columns);
        }

        for field in &self.config.bulk_date_fields {
            if !columns.contains(field) {
                continue;
            }
            let values: Vec<Option<String>> = records
                .iter()
                .map(|r| r.get(field).map(str::to_string))
                .collect();
            for (record, value) in records.iter_mut().zip(normalize_date_column(&values)) {
                record.set(field.clone(), value);
            }
        }

        debug!(records = records.len(), columns = columns.len(), "Cleaned batch");
        CleanedBatch { records, columns }
    }
}
