use serde::{Deserialize, Serialize};
use std::env;

/// Google Cloud Storage's S3-interoperability endpoint
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";

/// Region accepted by the GCS interoperability API
pub const DEFAULT_STORAGE_REGION: &str = "auto";

/// URI scheme the warehouse uses to address stored objects
pub const DEFAULT_URI_SCHEME: &str = "gs";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
    /// Scheme used when handing object URIs to the warehouse ("gs", "s3")
    pub uri_scheme: String,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: match env::var("S3_ENDPOINT") {
                Ok(endpoint) if endpoint.is_empty() => None,
                Ok(endpoint) => Some(endpoint),
                Err(_) => Some(DEFAULT_STORAGE_ENDPOINT.to_string()),
            },
            region: env::var("S3_REGION").unwrap_or_else(|_| DEFAULT_STORAGE_REGION.to_string()),
            bucket: env::var("S3_BUCKET").unwrap_or_default(),
            access_key: env::var("S3_ACCESS_KEY")
                .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                .unwrap_or_default(),
            secret_key: env::var("S3_SECRET_KEY")
                .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_default(),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            uri_scheme: env::var("STORAGE_URI_SCHEME")
                .unwrap_or_else(|_| DEFAULT_URI_SCHEME.to_string()),
        }
    }

    /// Configuration for a GCS bucket reached through HMAC interoperability keys
    pub fn for_gcs(
        bucket: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: Some(DEFAULT_STORAGE_ENDPOINT.to_string()),
            region: DEFAULT_STORAGE_REGION.to_string(),
            bucket: bucket.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            path_style: false,
            uri_scheme: DEFAULT_URI_SCHEME.to_string(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bucket.is_empty() {
            anyhow::bail!("S3_BUCKET must be set");
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            anyhow::bail!("S3_ACCESS_KEY and S3_SECRET_KEY must be set");
        }
        if self.uri_scheme.is_empty() {
            anyhow::bail!("STORAGE_URI_SCHEME cannot be empty");
        }
        Ok(())
    }
}
