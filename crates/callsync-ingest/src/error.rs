//! Error types for the ingest pipeline
//!
//! Most of these are recovered from locally (retries, degraded reference maps,
//! empty schemas). Only staging and merge failures end a run.

use thiserror::Error;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Transport-level failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The CRM answered 429 Too Many Requests
    #[error("Rate limited by the CRM API")]
    RateLimited,

    /// Non-success HTTP status from a remote API
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Response body did not match the expected shape
    #[error("Failed to decode {service} response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },

    #[error("Warehouse error: {0}")]
    Warehouse(String),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The merge statement could not be built from the staging columns
    #[error("Invalid merge: {0}")]
    InvalidMerge(String),

    /// The warehouse rejected the merge statement
    #[error("Merge failed: {message}")]
    Merge {
        message: String,
        statement_excerpt: String,
    },
}

impl IngestError {
    /// True for the CRM's 429 throttling signal
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, IngestError::RateLimited)
    }
}
