//! Persistence for the fact and aggregate tables.
//!
//! [`OrderStore`] is the seam between the writer stages and the database.
//! [`PgOrderStore`] is the production backend; [`MemoryOrderStore`] keeps the
//! same upsert semantics in process for dry runs and tests.

mod memory;
mod postgres;

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use orderwatch_core::{AggregateRow, ClassifiedOrderRecord, FactRow};

use crate::error::PipelineError;

pub const FACT_TABLE: &str = "fact_orders_monitoring";
pub const AGGREGATE_TABLE: &str = "agg_orders_minutely";

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Create the fact table if it does not exist.
    async fn ensure_fact_table(&self) -> Result<(), PipelineError>;

    /// Create the aggregate table if it does not exist.
    async fn ensure_aggregate_table(&self) -> Result<(), PipelineError>;

    /// Upsert every record keyed by `order_id`, all or nothing.
    ///
    /// Existing rows get every field overwritten except `ingested_at`, which
    /// keeps its first-insert value. Returns the number of records processed.
    async fn upsert_facts(&self, records: &[ClassifiedOrderRecord]) -> Result<u64, PipelineError>;

    /// Recompute the minute buckets of every fact row with `updated_at >= since`
    /// and overwrite those buckets. Returns the number of buckets written.
    async fn refresh_minute_aggregates(&self, since: DateTime<Utc>) -> Result<u64, PipelineError>;

    async fn get_fact(&self, order_id: &str) -> Result<Option<FactRow>, PipelineError>;

    /// Aggregate rows with `ts_minute >= since`, oldest first.
    async fn aggregates_since(&self, since: DateTime<Utc>) -> Result<Vec<AggregateRow>, PipelineError>;

    /// Human-readable backend name for logs (e.g., "postgres", "memory").
    fn backend_name(&self) -> &str;
}
