//! Mirror backed by a Firebase-style REST key-value store.
//!
//! Records live at `<base>/parking_slots/Slot N/<PLATE>.json` and hold
//! `{"Entry_Time": ..., "Exit_Time": ...}`.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::Mirror;
use crate::models::{format_timestamp, LedgerChange, SlotNumber};

const ROOT: &str = "parking_slots";

/// HTTP client for the remote mirror.
#[derive(Debug, Clone)]
pub struct HttpMirror {
    client: reqwest::Client,
    base_url: String,
    auth: Option<String>,
}

impl HttpMirror {
    /// Create a mirror client for `base_url`, optionally sending an `auth` token.
    pub fn new(base_url: &str, auth: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build mirror HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// URL of the record for `plate` under `slot`.
    fn record_url(&self, slot: SlotNumber, plate: &str) -> String {
        let label = format!("Slot {slot}");
        let mut url = format!(
            "{}/{ROOT}/{}/{}.json",
            self.base_url,
            urlencoding::encode(&label),
            urlencoding::encode(plate)
        );
        if let Some(auth) = &self.auth {
            url = format!("{url}?auth={}", urlencoding::encode(auth));
        }
        url
    }
}

/// Request body for a change.
fn record_body(change: &LedgerChange) -> Value {
    match change {
        LedgerChange::Entered { entry_time, .. } => json!({
            "Entry_Time": format_timestamp(*entry_time),
            "Exit_Time": Value::Null,
        }),
        LedgerChange::Exited { exit_time, .. } => json!({
            "Exit_Time": format_timestamp(*exit_time),
        }),
    }
}

#[async_trait]
impl Mirror for HttpMirror {
    async fn apply(&self, change: &LedgerChange) -> Result<()> {
        let url = self.record_url(change.slot(), change.plate());
        let body = record_body(change);

        let request = match change {
            LedgerChange::Entered { .. } => self.client.put(&url),
            LedgerChange::Exited { .. } => self.client.patch(&url),
        };

        let resp = request
            .json(&body)
            .send()
            .await
            .context("Failed to reach mirror")?;

        if !resp.status().is_success() {
            bail!("Mirror returned {}", resp.status());
        }

        Ok(())
    }
}
