//! CRM webhook REST client
//!
//! Every method of the CRM REST API is a `POST {webhook}/{method}` with a JSON
//! body, answering `{"result": [...], "next": n, "total": n}`. This client
//! performs one request and classifies the outcome; retrying and pagination
//! belong to the callers.

use crate::config::CrmConfig;
use crate::error::{IngestError, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "crm";

/// One page of a list method
#[derive(Debug, Clone, PartialEq)]
pub struct CrmPage<T> {
    pub result: Vec<T>,
    /// Cursor for the following page, absent on the last page
    pub next: Option<u64>,
    pub total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<Vec<T>>,
    next: Option<u64>,
    total: Option<u64>,
    error: Option<String>,
    error_description: Option<String>,
}

pub struct CrmClient {
    client: Client,
    config: CrmConfig,
}

impl CrmClient {
    pub fn new(config: CrmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("callsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &CrmConfig {
        &self.config
    }

    /// POST `body` to `method` and decode one page.
    ///
    /// HTTP 429 maps to [`IngestError::RateLimited`]; any other non-success
    /// status, or a 200 carrying an `error` member, maps to
    /// [`IngestError::Status`].
    pub async fn post_page<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
    ) -> Result<CrmPage<T>> {
        let url = self.config.method_url(method);
        debug!(method, start = ?body.get("start"), "POST CRM method");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(IngestError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let envelope: Envelope<T> =
            serde_json::from_str(&text).map_err(|e| IngestError::Decode {
                service: SERVICE,
                message: format!("{} response: {}", method, e),
            })?;

        if let Some(error) = envelope.error {
            return Err(IngestError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: match envelope.error_description {
                    Some(description) => format!("{}: {}", error, description),
                    None => error,
                },
            });
        }

        Ok(CrmPage {
            result: envelope.result.unwrap_or_default(),
            next: envelope.next,
            total: envelope.total,
        })
    }
}
