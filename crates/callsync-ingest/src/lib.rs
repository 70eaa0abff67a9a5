//! Callsync Ingest
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Batch pipeline moving CRM call statistics into the warehouse.
//!
//! # Overview
//!
//! - **Fetch**: paginated, rate-limit aware reads of the CRM call report
//!   ([`fetcher`], [`crm`])
//! - **Reference data**: user, SIP line and call type labels ([`reference`])
//! - **Normalize**: script, phone, date and source channel cleanup
//!   ([`normalize`])
//! - **Stage**: NDJSON in object storage, truncating load into the staging
//!   table ([`staging`], [`storage`])
//! - **Merge**: schema-aware upsert of staging into the main table
//!   ([`merge`], [`warehouse`])
//!
//! Runs must be serialized externally: two concurrent runs share the staging
//! table.

pub mod config;
pub mod crm;
pub mod error;
pub mod fetcher;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod reference;
pub mod staging;
pub mod storage;
pub mod warehouse;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{IngestError, Result};
pub use pipeline::{Pipeline, RunSummary};
