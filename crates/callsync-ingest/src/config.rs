//! Pipeline configuration
//!
//! Everything a run needs is carried in one [`PipelineConfig`] built from the
//! environment (a `.env` file is honoured) and handed to each component at
//! construction. Retry and pacing intervals live here as well so tests can
//! compress them to zero.

use crate::reference::ReferenceKind;
use crate::storage::StorageConfig;
use crate::warehouse::TableRef;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// CRM Defaults
// ============================================================================

/// Call statistics method of the CRM REST API.
pub const DEFAULT_CALLS_METHOD: &str = "voximplant.statistic.get";

/// Portal users method.
pub const DEFAULT_USERS_METHOD: &str = "user.get";

/// Telephony SIP line method.
pub const DEFAULT_SIP_METHOD: &str = "voximplant.sip.get";

/// Rows per page; the CRM serves at most 50.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Per-request timeout in seconds.
pub const DEFAULT_CRM_TIMEOUT_SECS: u64 = 60;

/// Field used for the lower-bound filter and ascending order.
pub const DEFAULT_DATE_FIELD: &str = "CALL_START_DATE";

// ============================================================================
// Retry Defaults
// ============================================================================

/// Pause after an HTTP 429 before retrying the same page.
pub const DEFAULT_RATE_LIMIT_COOLDOWN_MS: u64 = 10_000;

/// Pause after a transient network failure.
pub const DEFAULT_NETWORK_BACKOFF_MS: u64 = 5_000;

/// Attempts per page before giving up on pagination.
pub const DEFAULT_MAX_RETRIES: u32 = 30;

/// Delay between successive call pages.
pub const DEFAULT_PAGE_PACING_MS: u64 = 500;

/// Delay between successive SIP line pages.
pub const DEFAULT_SIP_PAGE_PACING_MS: u64 = 500;

// ============================================================================
// Warehouse Defaults
// ============================================================================

/// BigQuery REST API root.
pub const DEFAULT_WAREHOUSE_API_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Interval between job status polls.
pub const DEFAULT_JOB_POLL_MS: u64 = 1_000;

/// Give up waiting on a warehouse job after this many seconds.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 600;

/// Suffix appended to the main table name when no staging table is configured.
pub const DEFAULT_STAGING_SUFFIX: &str = "_Staging";

/// Days of history fetched per run.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 1;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub crm: CrmConfig,
    pub retry: RetryConfig,
    pub warehouse: WarehouseConfig,
    pub storage: StorageConfig,
    pub cleaning: CleaningConfig,
    pub lookback_days: u32,
}

/// CRM endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// Inbound webhook root, e.g. `https://portal.example.com/rest/1/token/`
    pub webhook_url: String,
    pub calls_method: String,
    pub users_method: String,
    pub sip_method: String,
    pub page_size: usize,
    pub timeout_secs: u64,
    pub date_field: String,
}

/// Retry, backoff and pacing intervals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub rate_limit_cooldown: Duration,
    pub network_backoff: Duration,
    pub max_retries: u32,
    pub page_pacing: Duration,
    pub sip_page_pacing: Duration,
}

/// Warehouse identifiers and API access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub main_table: String,
    pub staging_table: String,
    pub api_url: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub job_poll_interval: Duration,
    pub job_timeout: Duration,
}

/// Field codes the record cleaner reads and the columns it writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningConfig {
    pub phone_field: String,
    pub title_field: String,
    pub phone_column: String,
    pub source_field: String,
    /// Read when `source_field` is absent from a record
    pub source_alt_field: String,
    pub contact_source_field: String,
    pub source_column: String,
    pub creation_field: String,
    pub system_created_field: String,
    pub creation_column: String,
    /// Normalized row by row with the explicit format list
    pub date_fields: Vec<String>,
    /// Normalized column-wise with UTC interpretation
    pub bulk_date_fields: Vec<String>,
    pub enrichment: Vec<EnrichmentRule>,
}

/// Label a code column through one of the reference maps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRule {
    pub source_field: String,
    pub target_column: String,
    pub map: ReferenceKind,
}

impl EnrichmentRule {
    pub fn new(source_field: &str, target_column: &str, map: ReferenceKind) -> Self {
        Self {
            source_field: source_field.to_string(),
            target_column: target_column.to_string(),
            map,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the environment
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            crm: CrmConfig::from_env(),
            retry: RetryConfig::from_env(),
            warehouse: WarehouseConfig::from_env(),
            storage: StorageConfig::from_env(),
            cleaning: CleaningConfig::from_env(),
            lookback_days: env_parse("SYNC_LOOKBACK_DAYS", DEFAULT_LOOKBACK_DAYS),
        };

        config.validate()?;
        Ok(config)
    }

    /// Configuration with default retry, cleaning and lookback settings
    pub fn new(crm: CrmConfig, warehouse: WarehouseConfig, storage: StorageConfig) -> Self {
        Self {
            crm,
            retry: RetryConfig::default(),
            warehouse,
            storage,
            cleaning: CleaningConfig::default(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cleaning(mut self, cleaning: CleaningConfig) -> Self {
        self.cleaning = cleaning;
        self
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    /// Validate what every run needs: the CRM side
    pub fn validate(&self) -> anyhow::Result<()> {
        self.crm.validate()?;
        self.retry.validate()?;
        self.cleaning.validate()?;
        Ok(())
    }

    /// Validate the warehouse and object store, needed unless dry-running
    pub fn validate_sinks(&self) -> anyhow::Result<()> {
        self.warehouse.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}

impl CrmConfig {
    pub fn from_env() -> Self {
        Self {
            webhook_url: std::env::var("CRM_WEBHOOK_URL").unwrap_or_default(),
            calls_method: env_or("CRM_CALLS_METHOD", DEFAULT_CALLS_METHOD),
            users_method: env_or("CRM_USERS_METHOD", DEFAULT_USERS_METHOD),
            sip_method: env_or("CRM_SIP_METHOD", DEFAULT_SIP_METHOD),
            page_size: env_parse("CRM_PAGE_SIZE", DEFAULT_PAGE_SIZE),
            timeout_secs: env_parse("CRM_TIMEOUT_SECS", DEFAULT_CRM_TIMEOUT_SECS),
            date_field: env_or("CRM_DATE_FIELD", DEFAULT_DATE_FIELD),
        }
    }

    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            calls_method: DEFAULT_CALLS_METHOD.to_string(),
            users_method: DEFAULT_USERS_METHOD.to_string(),
            sip_method: DEFAULT_SIP_METHOD.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: DEFAULT_CRM_TIMEOUT_SECS,
            date_field: DEFAULT_DATE_FIELD.to_string(),
        }
    }

    /// Full URL of a REST method under the webhook root
    pub fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.webhook_url.trim_end_matches('/'), method)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.webhook_url.is_empty() {
            anyhow::bail!("CRM_WEBHOOK_URL must be set");
        }
        if !self.webhook_url.starts_with("http://") && !self.webhook_url.starts_with("https://") {
            anyhow::bail!("CRM_WEBHOOK_URL must be an http(s) URL");
        }
        if self.page_size == 0 {
            anyhow::bail!("CRM_PAGE_SIZE must be greater than 0");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("CRM_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            rate_limit_cooldown: Duration::from_millis(DEFAULT_RATE_LIMIT_COOLDOWN_MS),
            network_backoff: Duration::from_millis(DEFAULT_NETWORK_BACKOFF_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            page_pacing: Duration::from_millis(DEFAULT_PAGE_PACING_MS),
            sip_page_pacing: Duration::from_millis(DEFAULT_SIP_PAGE_PACING_MS),
        }
    }
}

impl RetryConfig {
    pub fn from_env() -> Self {
        Self {
            rate_limit_cooldown: env_millis(
                "CRM_RATE_LIMIT_COOLDOWN_MS",
                DEFAULT_RATE_LIMIT_COOLDOWN_MS,
            ),
            network_backoff: env_millis("CRM_NETWORK_BACKOFF_MS", DEFAULT_NETWORK_BACKOFF_MS),
            max_retries: env_parse("CRM_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            page_pacing: env_millis("CRM_PAGE_PACING_MS", DEFAULT_PAGE_PACING_MS),
            sip_page_pacing: env_millis("CRM_SIP_PAGE_PACING_MS", DEFAULT_SIP_PAGE_PACING_MS),
        }
    }

    /// Zero every wait, keeping the attempt budget
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            rate_limit_cooldown: Duration::ZERO,
            network_backoff: Duration::ZERO,
            max_retries,
            page_pacing: Duration::ZERO,
            sip_page_pacing: Duration::ZERO,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_retries == 0 {
            anyhow::bail!("CRM_MAX_RETRIES must be greater than 0");
        }
        Ok(())
    }
}

impl WarehouseConfig {
    pub fn from_env() -> Self {
        let main_table = std::env::var("WAREHOUSE_MAIN_TABLE").unwrap_or_default();
        let staging_table = std::env::var("WAREHOUSE_STAGING_TABLE")
            .unwrap_or_else(|_| format!("{}{}", main_table, DEFAULT_STAGING_SUFFIX));

        Self {
            project_id: std::env::var("WAREHOUSE_PROJECT_ID").unwrap_or_default(),
            dataset_id: std::env::var("WAREHOUSE_DATASET_ID").unwrap_or_default(),
            main_table,
            staging_table,
            api_url: env_or("WAREHOUSE_API_URL", DEFAULT_WAREHOUSE_API_URL),
            access_token: std::env::var("WAREHOUSE_ACCESS_TOKEN").unwrap_or_default(),
            job_poll_interval: env_millis("WAREHOUSE_JOB_POLL_MS", DEFAULT_JOB_POLL_MS),
            job_timeout: Duration::from_secs(env_parse(
                "WAREHOUSE_JOB_TIMEOUT_SECS",
                DEFAULT_JOB_TIMEOUT_SECS,
            )),
        }
    }

    pub fn new(project_id: &str, dataset_id: &str, main_table: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            dataset_id: dataset_id.to_string(),
            main_table: main_table.to_string(),
            staging_table: format!("{}{}", main_table, DEFAULT_STAGING_SUFFIX),
            api_url: DEFAULT_WAREHOUSE_API_URL.to_string(),
            access_token: String::new(),
            job_poll_interval: Duration::from_millis(DEFAULT_JOB_POLL_MS),
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = token.into();
        self
    }

    pub fn main_ref(&self) -> TableRef {
        TableRef::new(&self.project_id, &self.dataset_id, &self.main_table)
    }

    pub fn staging_ref(&self) -> TableRef {
        TableRef::new(&self.project_id, &self.dataset_id, &self.staging_table)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.project_id.is_empty() || self.dataset_id.is_empty() {
            anyhow::bail!("WAREHOUSE_PROJECT_ID and WAREHOUSE_DATASET_ID must be set");
        }
        if self.main_table.is_empty() {
            anyhow::bail!("WAREHOUSE_MAIN_TABLE must be set");
        }
        if self.staging_table == self.main_table {
            anyhow::bail!(
                "Staging table cannot be the main table ({})",
                self.main_table
            );
        }
        if self.access_token.is_empty() {
            anyhow::bail!("WAREHOUSE_ACCESS_TOKEN must be set");
        }
        if self.job_poll_interval.is_zero() {
            anyhow::bail!("WAREHOUSE_JOB_POLL_MS must be greater than 0");
        }
        Ok(())
    }
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            phone_field: "UF_CRM_1725452218751".to_string(),
            title_field: "TITLE".to_string(),
            phone_column: "PHONE".to_string(),
            source_field: "SOURCE_ID".to_string(),
            source_alt_field: "source".to_string(),
            contact_source_field: "CONTACT_SOURCE".to_string(),
            source_column: "SOURCE_ID".to_string(),
            creation_field: "UF_CRM_1736158245296".to_string(),
            system_created_field: "DATE_CREATE".to_string(),
            creation_column: "CREATION_DATE".to_string(),
            date_fields: vec!["CALL_START_DATE".to_string()],
            bulk_date_fields: vec!["DATE_MODIFY".to_string()],
            enrichment: vec![
                EnrichmentRule::new("PORTAL_USER_ID", "PORTAL_USER", ReferenceKind::Users),
                EnrichmentRule::new("PORTAL_NUMBER", "PORTAL_NAME", ReferenceKind::SipLines),
                EnrichmentRule::new("CALL_TYPE", "CALL_TYPE_NAME", ReferenceKind::CallTypes),
            ],
        }
    }
}

impl CleaningConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            phone_field: env_or("CLEAN_PHONE_FIELD", &defaults.phone_field),
            creation_field: env_or("CLEAN_CREATION_FIELD", &defaults.creation_field),
            date_fields: env_list("CLEAN_DATE_FIELDS").unwrap_or(defaults.date_fields.clone()),
            bulk_date_fields: env_list("CLEAN_BULK_DATE_FIELDS")
                .unwrap_or(defaults.bulk_date_fields.clone()),
            ..defaults
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.date_fields.iter().any(|f| self.bulk_date_fields.contains(f)) {
            anyhow::bail!("A field cannot be both a row date field and a bulk date field");
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_parse(key, default_ms))
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|s| {
        s.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_method_url_joins_without_double_slash() {
        let crm = CrmConfig::new("https://portal.example.com/rest/1/abc/");
        assert_eq!(
            crm.method_url("user.get"),
            "https://portal.example.com/rest/1/abc/user.get"
        );
    }

    #[test]
    fn test_retry_defaults() {
        let retry = RetryConfig::default();
        assert_eq!(retry.rate_limit_cooldown, Duration::from_secs(10));
        assert_eq!(retry.network_backoff, Duration::from_secs(5));
        assert_eq!(retry.max_retries, 30);
        assert_eq!(retry.sip_page_pacing, Duration::from_millis(500));
    }

    #[test]
    fn test_crm_validation() {
        assert!(CrmConfig::new("").validate().is_err());
        assert!(CrmConfig::new("ftp://example.com").validate().is_err());

        let mut crm = CrmConfig::new("https://example.com/rest/1/x");
        assert!(crm.validate().is_ok());
        crm.page_size = 0;
        assert!(crm.validate().is_err());
    }

    #[test]
    fn test_warehouse_refs_and_validation() {
        let mut warehouse = WarehouseConfig::new("proj", "crm", "Crm_Calls");
        assert_eq!(warehouse.main_ref().to_string(), "proj.crm.Crm_Calls");
        assert_eq!(warehouse.staging_ref().to_string(), "proj.crm.Crm_Calls_Staging");
        assert!(warehouse.validate().is_err(), "token is required");

        warehouse.access_token = "token".to_string();
        assert!(warehouse.validate().is_ok());

        warehouse.staging_table = "Crm_Calls".to_string();
        assert!(warehouse.validate().is_err());
    }

    #[test]
    fn test_cleaning_rejects_overlapping_date_fields() {
        let mut cleaning = CleaningConfig::default();
        assert!(cleaning.validate().is_ok());
        cleaning.bulk_date_fields.push("CALL_START_DATE".to_string());
        assert!(cleaning.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("CRM_WEBHOOK_URL", "https://portal.example.com/rest/9/key");
        std::env::set_var("CRM_MAX_RETRIES", "4");
        std::env::set_var("CRM_RATE_LIMIT_COOLDOWN_MS", "25");
        std::env::set_var("WAREHOUSE_MAIN_TABLE", "Calls");
        std::env::set_var("CLEAN_DATE_FIELDS", "CALL_START_DATE, DATE_CLOSED");
        std::env::set_var("SYNC_LOOKBACK_DAYS", "3");

        let config = PipelineConfig::from_env().unwrap();
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.retry.rate_limit_cooldown, Duration::from_millis(25));
        assert_eq!(config.warehouse.staging_table, "Calls_Staging");
        assert_eq!(
            config.cleaning.date_fields,
            vec!["CALL_START_DATE".to_string(), "DATE_CLOSED".to_string()]
        );
        assert_eq!(config.lookback_days, 3);

        for key in [
            "CRM_WEBHOOK_URL",
            "CRM_MAX_RETRIES",
            "CRM_RATE_LIMIT_COOLDOWN_MS",
            "WAREHOUSE_MAIN_TABLE",
            "CLEAN_DATE_FIELDS",
            "SYNC_LOOKBACK_DAYS",
        ] {
            std::env::remove_var(key);
        }
    }
}
