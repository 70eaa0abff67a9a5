//! Record normalization
//!
//! Everything under this module is a pure function of its input, apart from
//! [`RecordCleaner`] which threads configuration and reference maps through
//! them column by column.

pub mod date;
pub mod phone;
pub mod record;
pub mod source;
pub mod text;

pub use date::{fix_date_format, is_date_sentinel, normalize_date_column};
pub use phone::{best_phone, extract_last_10_digits};
pub use record::{creation_date, CleanedBatch, RecordCleaner};
pub use source::{classify_source, SourceRule, SOURCE_RULES};
pub use text::normalize_script;

use regex::Regex;
use std::sync::OnceLock;

/// Compile a literal pattern once.
///
/// Only called with string literals that the module tests exercise.
#[allow(clippy::expect_used)]
fn cached_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("literal pattern compiles"))
}
