//! BigQuery REST client
//!
//! Only the handful of endpoints the pipeline needs: `tables.get` for the
//! schema, `jobs.query` for statements, `jobs.insert` for loads and `jobs.get`
//! to wait on either.

use super::{TableRef, TableSchema, Warehouse};
use crate::config::WarehouseConfig;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

const SERVICE: &str = "warehouse";

/// Server-side wait requested from `jobs.query` before it returns
const QUERY_TIMEOUT_MS: u64 = 30_000;

pub struct BigQueryClient {
    client: Client,
    api_url: String,
    project_id: String,
    access_token: String,
    poll_interval: Duration,
    job_timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    status: Option<JobStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: bool,
}

#[derive(Debug, Deserialize)]
struct TableResource {
    schema: Option<SchemaResource>,
}

#[derive(Debug, Deserialize)]
struct SchemaResource {
    #[serde(default)]
    fields: Vec<FieldResource>,
}

#[derive(Debug, Deserialize)]
struct FieldResource {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl BigQueryClient {
    pub fn new(config: &WarehouseConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(QUERY_TIMEOUT_MS) + Duration::from_secs(30))
            .user_agent(concat!("callsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            access_token: config.access_token.clone(),
            poll_interval: config.job_poll_interval,
            job_timeout: config.job_timeout,
        })
    }

    fn project_url(&self, project_id: &str) -> String {
        format!("{}/projects/{}", self.api_url, project_id)
    }

    /// Poll `jobs.get` until the job is DONE, surfacing its error result
    async fn wait_for_job(&self, job: &JobReference) -> Result<()> {
        let deadline = Instant::now() + self.job_timeout;
        let url = format!("{}/jobs/{}", self.project_url(&job.project_id), job.job_id);

        loop {
            let mut request = self.client.get(&url).bearer_auth(&self.access_token);
            if let Some(location) = &job.location {
                request = request.query(&[("location", location)]);
            }

            let current: Job = read_json(request.send().await?).await?;
            if let Some(status) = current.status {
                debug!(job_id = %job.job_id, state = %status.state, "Polled warehouse job");
                if status.state == "DONE" {
                    return job_outcome(&job.job_id, status);
                }
            }

            if Instant::now() >= deadline {
                return Err(IngestError::Warehouse(format!(
                    "Job {} did not finish within {:?}",
                    job.job_id, self.job_timeout
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    #[instrument(skip(self), fields(table = %table))]
    async fn table_schema(&self, table: &TableRef) -> Result<TableSchema> {
        let url = format!(
            "{}/datasets/{}/tables/{}",
            self.project_url(&table.project_id),
            table.dataset_id,
            table.table_id
        );

        let resource: TableResource =
            read_json(self.client.get(&url).bearer_auth(&self.access_token).send().await?)
                .await?;

        let schema: TableSchema = resource
            .schema
            .map(|s| s.fields)
            .unwrap_or_default()
            .iter()
            .map(|f| (f.name.as_str(), f.field_type.as_str()))
            .collect();

        debug!(columns = schema.len(), "Fetched table schema");
        Ok(schema)
    }

    #[instrument(skip(self, sql), fields(sql_len = sql.len()))]
    async fn execute(&self, sql: &str) -> Result<()> {
        let url = format!("{}/queries", self.project_url(&self.project_id));
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": QUERY_TIMEOUT_MS,
        });

        let response: QueryResponse = read_json(
            self.client
                .post(&url)
                .bearer_auth(&self.access_token)
                .json(&body)
                .send()
                .await?,
        )
        .await?;

        if response.job_complete {
            return Ok(());
        }

        match response.job_reference {
            Some(job) => {
                info!(job_id = %job.job_id, "Statement still running, waiting for job");
                self.wait_for_job(&job).await
            },
            None => Err(IngestError::Decode {
                service: SERVICE,
                message: "incomplete query response without a job reference".to_string(),
            }),
        }
    }

    #[instrument(skip(self), fields(table = %table))]
    async fn load_truncate(&self, table: &TableRef, source_uri: &str) -> Result<()> {
        let url = format!("{}/jobs", self.project_url(&self.project_id));
        let body = json!({
            "configuration": {
                "load": {
                    "sourceUris": [source_uri],
                    "destinationTable": {
                        "projectId": table.project_id,
                        "datasetId": table.dataset_id,
                        "tableId": table.table_id,
                    },
                    "sourceFormat": "NEWLINE_DELIMITED_JSON",
                    "writeDisposition": "WRITE_TRUNCATE",
                    "createDisposition": "CREATE_IF_NEEDED",
                    "autodetect": true,
                }
            }
        });

        let job: Job = read_json(
            self.client
                .post(&url)
                .bearer_auth(&self.access_token)
                .json(&body)
                .send()
                .await?,
        )
        .await?;

        match job.status {
            Some(status) if status.state == "DONE" => {
                job_outcome(&job.job_reference.job_id, status)
            },
            _ => self.wait_for_job(&job.job_reference).await,
        }?;

        info!(source = %source_uri, "Loaded staging table");
        Ok(())
    }
}

fn job_outcome(job_id: &str, status: JobStatus) -> Result<()> {
    match status.error_result {
        Some(error) => Err(IngestError::Warehouse(format!(
            "Job {} failed ({}): {}",
            job_id,
            error.reason.as_deref().unwrap_or("unknown"),
            error.message
        ))),
        None => Ok(()),
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(IngestError::Status {
            service: SERVICE,
            status: status.as_u16(),
            body: message,
        });
    }

    response.json::<T>().await.map_err(|e| IngestError::Decode {
        service: SERVICE,
        message: e.to_string(),
    })
}
