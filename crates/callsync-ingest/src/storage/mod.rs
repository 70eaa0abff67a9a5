//! Object storage for pipeline artifacts
//!
//! Raw snapshots and staged batches are written here before the warehouse
//! picks them up. The production store talks to any S3-compatible API; the
//! default endpoint is GCS's interoperability endpoint so the warehouse can
//! load the objects by `gs://` URI.

use crate::error::{IngestError, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

pub mod config;

pub use config::StorageConfig;

/// Write/read-by-key blob store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<UploadResult>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// URI under which the warehouse can address `key`
    fn uri_for(&self, key: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub key: String,
    pub uri: String,
    pub checksum: String,
    pub size: usize,
}

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    uri_scheme: String,
}

impl S3Store {
    pub fn new(config: StorageConfig) -> Self {
        debug!(bucket = %config.bucket, endpoint = ?config.endpoint, "Initializing object store");

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "callsync-storage",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
            uri_scheme: config.uri_scheme,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self, data))]
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<UploadResult> {
        let checksum = calculate_sha256(&data);
        let size = data.len();

        debug!("Uploading {} bytes to {}", size, self.uri_for(key));

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| IngestError::Storage(format!("Failed to upload {}: {}", key, e)))?;

        let uri = self.uri_for(key);
        info!(uri = %uri, size, checksum = %checksum, "Uploaded object");

        Ok(UploadResult {
            key: key.to_string(),
            uri,
            checksum,
            size,
        })
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| IngestError::Storage(format!("Failed to download {}: {}", key, e)))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| IngestError::Storage(format!("Failed to read {}: {}", key, e)))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from {}", data.len(), self.uri_for(key));
        Ok(data)
    }

    fn uri_for(&self, key: &str) -> String {
        object_uri(&self.uri_scheme, &self.bucket, key)
    }
}

pub fn object_uri(scheme: &str, bucket: &str, key: &str) -> String {
    format!("{}://{}/{}", scheme, bucket, key.trim_start_matches('/'))
}

pub fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_for() {
        let store = S3Store::new(StorageConfig::for_gcs("calls-bucket", "key", "secret"));
        assert_eq!(
            store.uri_for("staging/run.ndjson"),
            "gs://calls-bucket/staging/run.ndjson"
        );
        assert_eq!(object_uri("s3", "b", "/raw/x.ndjson"), "s3://b/raw/x.ndjson");
    }

    #[test]
    fn test_calculate_sha256() {
        let checksum = calculate_sha256(b"Hello, World!");
        assert_eq!(
            checksum,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }
}
