//! Lookup tables used to label code columns
//!
//! Users and SIP lines are read from the CRM once per run; call types are a
//! fixed table. Loading is best-effort: a failing map keeps whatever pages it
//! collected and never affects the other maps.

use crate::config::RetryConfig;
use crate::crm::CrmClient;
use crate::normalize::normalize_script;
use callsync_common::RawRecord;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

/// Call type codes as the telephony statistics report them
pub const CALL_TYPES: &[(&str, &str)] = &[("0", "Outgoing"), ("1", "Incoming")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Users,
    SipLines,
    CallTypes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceMaps {
    pub users: HashMap<String, String>,
    pub sip_lines: HashMap<String, String>,
    pub call_types: HashMap<String, String>,
}

impl Default for ReferenceMaps {
    fn default() -> Self {
        Self {
            users: HashMap::new(),
            sip_lines: HashMap::new(),
            call_types: call_type_map(),
        }
    }
}

impl ReferenceMaps {
    /// Load users and SIP lines from the CRM
    pub async fn load(client: &CrmClient, retry: &RetryConfig) -> Self {
        let config = client.config();

        let users = collect_pages::<RawRecord>(client, &config.users_method, Duration::ZERO)
            .await
            .iter()
            .filter_map(user_entry)
            .collect::<HashMap<_, _>>();

        let sip_lines = collect_pages::<RawRecord>(client, &config.sip_method, retry.sip_page_pacing)
            .await
            .iter()
            .filter_map(sip_entry)
            .collect::<HashMap<_, _>>();

        let maps = Self {
            users,
            sip_lines,
            call_types: call_type_map(),
        };

        info!(
            users = maps.users.len(),
            sip_lines = maps.sip_lines.len(),
            call_types = maps.call_types.len(),
            "Reference maps loaded"
        );
        maps
    }

    pub fn get(&self, kind: ReferenceKind) -> &HashMap<String, String> {
        match kind {
            ReferenceKind::Users => &self.users,
            ReferenceKind::SipLines => &self.sip_lines,
            ReferenceKind::CallTypes => &self.call_types,
        }
    }

    pub fn lookup(&self, kind: ReferenceKind, code: &str) -> Option<&str> {
        self.get(kind).get(code).map(String::as_str)
    }

    pub fn insert(&mut self, kind: ReferenceKind, code: &str, label: &str) {
        let map = match kind {
            ReferenceKind::Users => &mut self.users,
            ReferenceKind::SipLines => &mut self.sip_lines,
            ReferenceKind::CallTypes => &mut self.call_types,
        };
        map.insert(code.to_string(), label.to_string());
    }

    /// Builder-style variant of [`ReferenceMaps::insert`]
    pub fn with(mut self, kind: ReferenceKind, code: &str, label: &str) -> Self {
        self.insert(kind, code, label);
        self
    }
}

fn call_type_map() -> HashMap<String, String> {
    CALL_TYPES
        .iter()
        .map(|(code, label)| (code.to_string(), label.to_string()))
        .collect()
}

/// `ID` → script-normalized `"NAME LAST_NAME"`
fn user_entry(user: &RawRecord) -> Option<(String, String)> {
    let id = user.id()?;
    let full_name = format!(
        "{} {}",
        user.text("NAME").unwrap_or_default(),
        user.text("LAST_NAME").unwrap_or_default()
    );
    Some((id, normalize_script(Some(full_name.trim()))))
}

/// `reg{REG_ID}` → `TITLE`, only when both are present
fn sip_entry(line: &RawRecord) -> Option<(String, String)> {
    let reg_id = line.text("REG_ID").filter(|s| !s.is_empty())?;
    let title = line.text("TITLE").filter(|s| !s.is_empty())?;
    Some((format!("reg{}", reg_id), title))
}

/// Follow `next` cursors until an empty page, a missing cursor or an error.
///
/// Errors are logged and end the walk; pages already collected are kept.
async fn collect_pages<T: DeserializeOwned>(
    client: &CrmClient,
    method: &str,
    pacing: Duration,
) -> Vec<T> {
    let mut items = Vec::new();
    let mut start: u64 = 0;

    loop {
        let page = match client.post_page::<T>(method, &json!({ "start": start })).await {
            Ok(page) => page,
            Err(e) => {
                warn!(method, start, error = %e, "Reference fetch failed, keeping partial map");
                break;
            },
        };

        if page.result.is_empty() {
            break;
        }
        items.extend(page.result);

        match page.next {
            Some(next) => {
                start = next;
                if !pacing.is_zero() {
                    tokio::time::sleep(pacing).await;
                }
            },
            None => break,
        }
    }

    items
}
