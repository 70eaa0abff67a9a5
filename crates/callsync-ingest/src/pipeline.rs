//! End-to-end run: fetch, clean, stage, merge
//!
//! Steps run one after another on a single task. Recoverable failures are
//! absorbed inside the steps; only staging and merge errors reach the caller.

use crate::config::{CleaningConfig, PipelineConfig};
use crate::crm::CrmClient;
use crate::error::{IngestError, Result};
use crate::fetcher::CallFetcher;
use crate::merge::MergeExecutor;
use crate::normalize::{CleanedBatch, RecordCleaner};
use crate::reference::ReferenceMaps;
use crate::staging::StagingWriter;
use crate::storage::{ObjectStore, S3Store};
use crate::warehouse::{BigQueryClient, Warehouse};
use callsync_common::RawRecord;
use chrono::{Duration, Local, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Outcome of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub since: NaiveDate,
    pub fetched: usize,
    pub cleaned: usize,
    pub staged_uri: Option<String>,
    pub merged: bool,
}

/// Raw and cleaned records of one fetch
#[derive(Debug, Clone)]
pub struct Extract {
    pub raw: Vec<RawRecord>,
    pub batch: CleanedBatch,
}

/// Lower bound of the fetch window, `lookback_days` before today
pub fn since_date(lookback_days: u32) -> NaiveDate {
    Local::now().date_naive() - Duration::days(i64::from(lookback_days))
}

/// Load reference maps, fetch and clean; no sinks involved
pub async fn extract(fetcher: &CallFetcher, cleaning: &CleaningConfig, since: NaiveDate) -> Extract {
    let maps = ReferenceMaps::load(fetcher.client(), fetcher.retry()).await;
    let raw = fetcher.fetch(since).await;
    let batch = RecordCleaner::new(cleaning, &maps).clean_batch(&raw);
    Extract { raw, batch }
}

pub struct Pipeline {
    fetcher: CallFetcher,
    cleaning: CleaningConfig,
    staging: StagingWriter,
    merger: MergeExecutor,
}

impl Pipeline {
    pub fn new(
        config: &PipelineConfig,
        store: Arc<dyn ObjectStore>,
        warehouse: Arc<dyn Warehouse>,
    ) -> Result<Self> {
        let client = CrmClient::new(config.crm.clone())?;

        Ok(Self {
            fetcher: CallFetcher::new(client, config.retry.clone()),
            cleaning: config.cleaning.clone(),
            staging: StagingWriter::new(
                store,
                Arc::clone(&warehouse),
                config.warehouse.staging_ref(),
            ),
            merger: MergeExecutor::new(
                warehouse,
                config.warehouse.main_ref(),
                config.warehouse.staging_ref(),
            ),
        })
    }

    /// Wire the production object store and warehouse client
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config
            .validate_sinks()
            .map_err(|e| IngestError::Config(e.to_string()))?;

        let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(config.storage.clone()));
        let warehouse: Arc<dyn Warehouse> = Arc::new(BigQueryClient::new(&config.warehouse)?);
        Self::new(config, store, warehouse)
    }

    pub async fn run(&self, lookback_days: u32) -> Result<RunSummary> {
        self.run_since(since_date(lookback_days)).await
    }

    #[instrument(skip(self), fields(run_id = %self.staging.run_id()))]
    pub async fn run_since(&self, since: NaiveDate) -> Result<RunSummary> {
        let Extract { raw, batch } = extract(&self.fetcher, &self.cleaning, since).await;

        let mut summary = RunSummary {
            since,
            fetched: raw.len(),
            cleaned: batch.len(),
            staged_uri: None,
            merged: false,
        };

        if batch.is_empty() {
            info!(since = %since, "No records fetched, skipping staging and merge");
            return Ok(summary);
        }

        self.staging.store_raw(&raw).await;

        let uri = self.staging.write(&batch).await?;
        summary.staged_uri = Some(uri);

        self.merger.merge(&batch.columns).await?;
        summary.merged = true;

        info!(
            fetched = summary.fetched,
            cleaned = summary.cleaned,
            "Run complete"
        );
        Ok(summary)
    }
}
