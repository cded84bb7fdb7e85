//! Fetch stage: pulls recently changed orders from the order API.

use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use orderwatch_core::config::OmsConfig;

use crate::error::PipelineError;

/// Trailing window and row cap for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub minutes: u32,
    pub limit: u32,
}

impl FetchWindow {
    pub fn from_config(config: &OmsConfig) -> Self {
        Self {
            minutes: config.window_minutes,
            limit: config.row_limit,
        }
    }
}

/// Client for the order API's recent-changes endpoint.
#[derive(Debug, Clone)]
pub struct OrderFetcher {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OrderFetcher {
    /// Build a fetcher. Fails when no API key is configured.
    pub fn new(config: &OmsConfig) -> Result<Self, PipelineError> {
        let api_key = config.require_api_key()?.to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            url: config.recent_url(),
            api_key,
            client,
        })
    }

    /// Request orders changed in the last `window.minutes`, at most `window.limit` rows.
    ///
    /// Returns the decoded body untouched; the order list is expected under `data`.
    pub async fn fetch_recent(&self, window: FetchWindow) -> Result<Value, PipelineError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("minutes", window.minutes), ("limit", window.limit)])
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(url = %self.url, %status, "order API returned non-2xx status");
            return Err(PipelineError::UpstreamStatus { status, body });
        }

        let body: Value = response.json().await?;
        let rows = body.get("data").and_then(Value::as_array).map_or(0, Vec::len);
        // Resolved outside `info!`, whose expansion shadows `Value` with tracing's trait.
        let upstream_total = body.get("total").and_then(Value::as_u64);
        info!(
            minutes = window.minutes,
            limit = window.limit,
            rows,
            upstream_total = ?upstream_total,
            "fetched recent orders"
        );
        Ok(body)
    }
}
