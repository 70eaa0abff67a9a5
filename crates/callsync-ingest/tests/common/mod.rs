//! Shared helpers for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use callsync_ingest::config::{CrmConfig, PipelineConfig, RetryConfig, WarehouseConfig};
use callsync_ingest::error::{IngestError, Result};
use callsync_ingest::storage::{calculate_sha256, object_uri, ObjectStore, StorageConfig, UploadResult};
use callsync_ingest::warehouse::{TableRef, TableSchema, Warehouse};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use wiremock::MockServer;

pub const WEBHOOK_PATH: &str = "/rest/1/key";

pub fn webhook_url(server: &MockServer) -> String {
    format!("{}{}/", server.uri(), WEBHOOK_PATH)
}

pub fn method_path(method: &str) -> String {
    format!("{}/{}", WEBHOOK_PATH, method)
}

/// Pipeline configuration against a mock CRM, with zeroed waits
pub fn test_config(server: &MockServer, max_retries: u32) -> PipelineConfig {
    PipelineConfig::new(
        CrmConfig::new(webhook_url(server)),
        WarehouseConfig::new("proj", "crm", "Calls").with_access_token("token"),
        StorageConfig::for_gcs("calls-bucket", "key", "secret"),
    )
    .with_retry(RetryConfig::immediate(max_retries))
}

/// `count` call rows with IDs starting at `first_id`
pub fn call_rows(first_id: u32, count: u32, marker: &str) -> Vec<Value> {
    (first_id..first_id + count)
        .map(|id| {
            json!({
                "ID": id.to_string(),
                "CALL_START_DATE": "2024-03-05T10:07:08+03:00",
                "PORTAL_USER_ID": "12",
                "CALL_TYPE": "1",
                "UF_CRM_1725452218751": false,
                "TITLE": format!("Call 0551{:06}", id),
                "MARKER": marker,
            })
        })
        .collect()
}

/// In-memory object store
#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    pub fail_puts: bool,
}

impl MemoryStore {
    pub fn failing() -> Self {
        Self {
            fail_puts: true,
            ..Self::default()
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn lines(&self, key: &str) -> Vec<Value> {
        let objects = self.objects.lock().unwrap();
        let (body, _) = objects.get(key).expect("object exists");
        String::from_utf8(body.clone())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<UploadResult> {
        if self.fail_puts {
            return Err(IngestError::Storage(format!("refused {}", key)));
        }
        let result = UploadResult {
            key: key.to_string(),
            uri: self.uri_for(key),
            checksum: calculate_sha256(&data),
            size: data.len(),
        };
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(result)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| IngestError::Storage(format!("missing {}", key)))
    }

    fn uri_for(&self, key: &str) -> String {
        object_uri("gs", "calls-bucket", key)
    }
}

/// Warehouse fake recording every call
#[derive(Default)]
pub struct RecordingWarehouse {
    pub schema: Option<TableSchema>,
    pub fail_execute: bool,
    pub fail_load: bool,
    pub statements: Mutex<Vec<String>>,
    pub loads: Mutex<Vec<(TableRef, String)>>,
}

impl RecordingWarehouse {
    pub fn with_schema(schema: TableSchema) -> Self {
        Self {
            schema: Some(schema),
            ..Self::default()
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn loads(&self) -> Vec<(TableRef, String)> {
        self.loads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for RecordingWarehouse {
    async fn table_schema(&self, table: &TableRef) -> Result<TableSchema> {
        self.schema
            .clone()
            .ok_or_else(|| IngestError::Warehouse(format!("no schema for {}", table)))
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        self.statements.lock().unwrap().push(sql.to_string());
        if self.fail_execute {
            return Err(IngestError::Warehouse("Syntax error at [3:1]".to_string()));
        }
        Ok(())
    }

    async fn load_truncate(&self, table: &TableRef, source_uri: &str) -> Result<()> {
        if self.fail_load {
            return Err(IngestError::Warehouse("load rejected".to_string()));
        }
        self.loads
            .lock()
            .unwrap()
            .push((table.clone(), source_uri.to_string()));
        Ok(())
    }
}
