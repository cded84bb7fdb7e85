//! Fact stage: idempotent upsert of classified orders into the fact table.
//!
//! Not safe to run concurrently for the same order id from two runs: both
//! upserts succeed and the later commit wins. The scheduler's single-run
//! guarantee is what keeps this well defined.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use orderwatch_core::ClassifiedOrderRecord;

use crate::error::PipelineError;
use crate::store::OrderStore;

#[derive(Clone)]
pub struct FactWriter {
    store: Arc<dyn OrderStore>,
}

impl FactWriter {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Upsert `records` and return how many were processed.
    ///
    /// An empty batch returns 0 without touching the store.
    pub async fn write(&self, records: &[ClassifiedOrderRecord]) -> Result<u64, PipelineError> {
        if records.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        self.store.ensure_fact_table().await?;
        let count = self.store.upsert_facts(records).await?;
        info!(
            rows = count,
            backend = self.store.backend_name(),
            duration_ms = start.elapsed().as_millis() as u64,
            "fact rows upserted"
        );
        Ok(count)
    }
}
