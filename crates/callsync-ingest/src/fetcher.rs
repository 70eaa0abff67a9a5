//! Paginated call statistics fetch
//!
//! Pages are requested strictly in cursor order. A page that keeps failing
//! ends pagination early and the rows collected so far are returned, so a
//! flaky CRM degrades a run instead of failing it.

use crate::config::RetryConfig;
use crate::crm::{CrmClient, CrmPage};
use crate::error::Result;
use callsync_common::RawRecord;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{error, info, warn};

pub struct CallFetcher {
    client: CrmClient,
    retry: RetryConfig,
}

impl CallFetcher {
    pub fn new(client: CrmClient, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    pub fn client(&self) -> &CrmClient {
        &self.client
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Fetch every call starting on or after `since`, deduplicated by ID
    pub async fn fetch(&self, since: NaiveDate) -> Vec<RawRecord> {
        let page_size = self.client.config().page_size;
        let mut collected: Vec<RawRecord> = Vec::new();
        let mut start: u64 = 0;

        info!(since = %since, "Fetching calls");

        loop {
            let body = self.page_body(since, start);
            let Some(page) = self.fetch_page(&body, start).await else {
                error!(
                    start,
                    attempts = self.retry.max_retries,
                    collected = collected.len(),
                    "Giving up on pagination, keeping partial result"
                );
                break;
            };

            let batch_len = page.result.len();
            if batch_len == 0 {
                break;
            }

            collected.extend(page.result);
            info!(start, total = collected.len(), "Fetched page");

            match page.next {
                Some(next) if batch_len >= page_size => {
                    start = next;
                    tokio::time::sleep(self.retry.page_pacing).await;
                },
                _ => break,
            }
        }

        let unique = dedupe_by_id(collected);
        info!(unique = unique.len(), "Fetch complete");
        unique
    }

    fn page_body(&self, since: NaiveDate, start: u64) -> Value {
        let date_field = &self.client.config().date_field;
        json!({
            "filter": { format!(">={}", date_field): since.format("%Y-%m-%d").to_string() },
            "select": ["*"],
            "order": { date_field.as_str(): "ASC" },
            "start": start,
        })
    }

    /// One page with the shared attempt budget; `None` once it is spent
    async fn fetch_page(&self, body: &Value, start: u64) -> Option<CrmPage<RawRecord>> {
        let method = &self.client.config().calls_method;

        for attempt in 1..=self.retry.max_retries {
            let result: Result<CrmPage<RawRecord>> = self.client.post_page(method, body).await;
            let wait = match result {
                Ok(page) => return Some(page),
                Err(e) if e.is_rate_limit() => {
                    warn!(start, attempt, "Rate limited, cooling down");
                    self.retry.rate_limit_cooldown
                },
                Err(e) => {
                    warn!(start, attempt, error = %e, "Page request failed, backing off");
                    self.retry.network_backoff
                },
            };

            if attempt < self.retry.max_retries {
                tokio::time::sleep(wait).await;
            }
        }

        None
    }
}

/// Drop repeated IDs, keeping the last occurrence where it last appeared.
///
/// Records without an ID cannot be merged and are discarded.
pub fn dedupe_by_id(records: Vec<RawRecord>) -> Vec<RawRecord> {
    let ids: Vec<Option<String>> = records.iter().map(RawRecord::id).collect();

    let mut last_seen: HashMap<&str, usize> = HashMap::new();
    for (index, id) in ids.iter().enumerate() {
        if let Some(id) = id {
            last_seen.insert(id.as_str(), index);
        }
    }

    let missing = ids.iter().filter(|id| id.is_none()).count();
    if missing > 0 {
        warn!(count = missing, "Dropping records without an ID");
    }

    let keep: Vec<bool> = ids
        .iter()
        .enumerate()
        .map(|(index, id)| {
            id.as_deref()
                .is_some_and(|id| last_seen.get(id) == Some(&index))
        })
        .collect();

    records
        .into_iter()
        .zip(keep)
        .filter_map(|(record, keep)| keep.then_some(record))
        .collect()
}
