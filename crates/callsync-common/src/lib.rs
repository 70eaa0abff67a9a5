//! Callsync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared record model and logging for the callsync workspace.
//!
//! # Overview
//!
//! - **Types**: CRM field values and the raw/cleaned record shapes that flow
//!   through the pipeline
//! - **Logging**: centralized `tracing` subscriber setup
//!
//! # Example
//!
//! ```
//! use callsync_common::types::{FieldValue, RawRecord};
//!
//! let record: RawRecord = serde_json::from_str(r#"{"ID": "7", "PHONE": false}"#).unwrap();
//! assert_eq!(record.id().as_deref(), Some("7"));
//! assert_eq!(record.get("PHONE"), Some(&FieldValue::Null));
//! ```

pub mod logging;
pub mod types;

// Re-export commonly used types
pub use types::{CleanedRecord, FieldValue, RawRecord};
