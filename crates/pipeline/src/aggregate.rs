//! Aggregate stage: minute-level rollups over the trailing day of facts.
//!
//! Buckets outside the lookback are never revisited, so rows for late or
//! backfilled data older than a day stay at whatever they were last computed as.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::error::PipelineError;
use crate::store::OrderStore;

pub const AGGREGATE_LOOKBACK_HOURS: i64 = 24;

#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn OrderStore>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub async fn refresh(&self) -> Result<u64, PipelineError> {
        self.refresh_at(Utc::now()).await
    }

    /// Recompute buckets for facts updated within the lookback ending at `now`.
    /// Returns the number of buckets written.
    pub async fn refresh_at(&self, now: DateTime<Utc>) -> Result<u64, PipelineError> {
        self.store.ensure_fact_table().await?;
        self.store.ensure_aggregate_table().await?;

        let since = now - Duration::hours(AGGREGATE_LOOKBACK_HOURS);
        let buckets = self.store.refresh_minute_aggregates(since).await?;
        info!(
            buckets,
            since = %since,
            backend = self.store.backend_name(),
            "minute aggregates refreshed"
        );
        Ok(buckets)
    }
}
