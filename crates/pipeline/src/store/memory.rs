use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use orderwatch_core::{truncate_to_minute, AggregateRow, ClassifiedOrderRecord, FactRow};

use super::{OrderStore, AGGREGATE_TABLE, FACT_TABLE};
use crate::error::PipelineError;

#[derive(Debug, Default)]
struct Tables {
    fact_table: bool,
    aggregate_table: bool,
    facts: BTreeMap<String, FactRow>,
    aggregates: BTreeMap<DateTime<Utc>, AggregateRow>,
}

/// In-process store with the same upsert semantics as [`super::PgOrderStore`].
///
/// Tables must be ensured before use, as with the real database. Every trait
/// call is counted so callers can assert that a stage never touched the store.
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    tables: Mutex<Tables>,
    accesses: AtomicU64,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store operations performed so far.
    pub fn accesses(&self) -> u64 {
        self.accesses.load(Ordering::Relaxed)
    }

    /// Snapshot of all fact rows ordered by order id.
    pub async fn facts(&self) -> Vec<FactRow> {
        self.tables.lock().await.facts.values().cloned().collect()
    }

    fn touch(&self) {
        self.accesses.fetch_add(1, Ordering::Relaxed);
    }
}

fn missing_table(name: &str) -> PipelineError {
    PipelineError::Persistence(format!("relation \"{name}\" does not exist"))
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn ensure_fact_table(&self) -> Result<(), PipelineError> {
        self.touch();
        self.tables.lock().await.fact_table = true;
        Ok(())
    }

    async fn ensure_aggregate_table(&self) -> Result<(), PipelineError> {
        self.touch();
        self.tables.lock().await.aggregate_table = true;
        Ok(())
    }

    async fn upsert_facts(&self, records: &[ClassifiedOrderRecord]) -> Result<u64, PipelineError> {
        self.touch();
        let mut tables = self.tables.lock().await;
        if !tables.fact_table {
            return Err(missing_table(FACT_TABLE));
        }

        // Reject the whole batch before applying anything, like a rolled-back transaction.
        for r in records {
            r.record
                .updated_at_utc()
                .map_err(|e| PipelineError::Persistence(e.to_string()))?;
        }

        let now = Utc::now();
        for r in records {
            let ingested_at = tables
                .facts
                .get(&r.record.order_id)
                .map_or(now, |existing| existing.ingested_at);
            tables.facts.insert(
                r.record.order_id.clone(),
                FactRow {
                    order: r.clone(),
                    ingested_at,
                },
            );
        }
        Ok(records.len() as u64)
    }

    async fn refresh_minute_aggregates(&self, since: DateTime<Utc>) -> Result<u64, PipelineError> {
        self.touch();
        let mut tables = self.tables.lock().await;
        if !tables.fact_table {
            return Err(missing_table(FACT_TABLE));
        }
        if !tables.aggregate_table {
            return Err(missing_table(AGGREGATE_TABLE));
        }

        let mut buckets: BTreeMap<DateTime<Utc>, AggregateRow> = BTreeMap::new();
        for fact in tables.facts.values() {
            let updated_at = fact
                .order
                .record
                .updated_at_utc()
                .map_err(|e| PipelineError::Persistence(e.to_string()))?;
            if updated_at < since {
                continue;
            }
            let minute = truncate_to_minute(updated_at);
            buckets
                .entry(minute)
                .or_insert_with(|| AggregateRow::empty(minute))
                .record(fact.order.flags);
        }

        let written = buckets.len() as u64;
        tables.aggregates.extend(buckets);
        Ok(written)
    }

    async fn get_fact(&self, order_id: &str) -> Result<Option<FactRow>, PipelineError> {
        self.touch();
        Ok(self.tables.lock().await.facts.get(order_id).cloned())
    }

    async fn aggregates_since(&self, since: DateTime<Utc>) -> Result<Vec<AggregateRow>, PipelineError> {
        self.touch();
        Ok(self
            .tables
            .lock()
            .await
            .aggregates
            .range(since..)
            .map(|(_, row)| row.clone())
            .collect())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
