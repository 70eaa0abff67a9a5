//! Staging table writer
//!
//! The cleaned batch is written as NDJSON to the object store and loaded into
//! the staging table with truncate semantics. The merge reads that table, so
//! a failed write must end the run rather than let a previous batch be
//! merged again.

use crate::error::{IngestError, Result};
use crate::normalize::CleanedBatch;
use crate::storage::ObjectStore;
use crate::warehouse::{TableRef, Warehouse};
use callsync_common::RawRecord;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

const STAGING_PREFIX: &str = "staging";
const RAW_PREFIX: &str = "raw";

/// One JSON document per line, newline terminated
pub fn to_ndjson<T: Serialize>(records: &[T]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.push(b'\n');
    }
    Ok(out)
}

/// Write `records` as NDJSON to a local file, returning the bytes written
pub async fn write_local<T: Serialize>(path: &Path, records: &[T]) -> Result<usize> {
    let body = to_ndjson(records)?;
    tokio::fs::write(path, &body).await?;
    Ok(body.len())
}

pub struct StagingWriter {
    store: Arc<dyn ObjectStore>,
    warehouse: Arc<dyn Warehouse>,
    staging: TableRef,
    run_id: String,
}

impl StagingWriter {
    pub fn new(store: Arc<dyn ObjectStore>, warehouse: Arc<dyn Warehouse>, staging: TableRef) -> Self {
        Self {
            store,
            warehouse,
            staging,
            run_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn key(&self, prefix: &str) -> String {
        format!("{}/{}.ndjson", prefix, self.run_id)
    }

    /// Keep the batch as fetched; failures are logged and ignored
    pub async fn store_raw(&self, records: &[RawRecord]) -> Option<String> {
        let key = self.key(RAW_PREFIX);
        let stored = match to_ndjson(records) {
            Ok(body) => self.store.put(&key, body, NDJSON_CONTENT_TYPE).await,
            Err(e) => Err(e),
        };

        match stored {
            Ok(upload) => Some(upload.uri),
            Err(e) => {
                warn!(key = %key, error = %e, "Could not store raw snapshot");
                None
            },
        }
    }

    /// Replace the staging table with `batch`, returning the staged object URI
    pub async fn write(&self, batch: &CleanedBatch) -> Result<String> {
        if batch.is_empty() {
            return Err(IngestError::Warehouse(
                "refusing to stage an empty batch".to_string(),
            ));
        }

        let body = to_ndjson(&batch.records)?;
        let upload = self
            .store
            .put(&self.key(STAGING_PREFIX), body, NDJSON_CONTENT_TYPE)
            .await?;

        info!(
            uri = %upload.uri,
            rows = batch.len(),
            bytes = upload.size,
            checksum = %upload.checksum,
            "Staged batch"
        );

        self.warehouse
            .load_truncate(&self.staging, &upload.uri)
            .await?;

        info!(table = %self.staging, rows = batch.len(), "Staging table replaced");
        Ok(upload.uri)
    }
}
