use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use orderwatch_core::config::PostgresConfig;
use orderwatch_core::{
    AggregateRow, ClassifiedOrderRecord, FactRow, NormalizedOrderRecord, OrderFlags, OrderStatus,
    OrderType,
};

use super::OrderStore;
use crate::error::PipelineError;

const CREATE_FACT_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS fact_orders_monitoring (
        order_id      text PRIMARY KEY,
        customer_id   text,
        customer_name text,
        status        text NOT NULL,
        order_type    text NOT NULL,
        total_amount  numeric,
        updated_at    timestamptz NOT NULL,
        item_name     text,
        item_detail   text,
        is_success    boolean NOT NULL,
        is_failed     boolean NOT NULL,
        is_delayed    boolean NOT NULL,
        ingested_at   timestamptz NOT NULL DEFAULT now()
    )";

const CREATE_AGGREGATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS agg_orders_minutely (
        ts_minute     timestamptz PRIMARY KEY,
        success_count bigint NOT NULL,
        failed_count  bigint NOT NULL,
        delayed_count bigint NOT NULL,
        total_count   bigint NOT NULL
    )";

// ingested_at is omitted from the update list so the first-seen value survives.
const UPSERT_FACT: &str = "
    INSERT INTO fact_orders_monitoring
        (order_id, customer_id, customer_name, status, order_type, total_amount,
         updated_at, item_name, item_detail, is_success, is_failed, is_delayed)
    VALUES ($1, $2, $3, $4, $5, $6::numeric, $7, $8, $9, $10, $11, $12)
    ON CONFLICT (order_id) DO UPDATE SET
        customer_id   = EXCLUDED.customer_id,
        customer_name = EXCLUDED.customer_name,
        status        = EXCLUDED.status,
        order_type    = EXCLUDED.order_type,
        total_amount  = EXCLUDED.total_amount,
        updated_at    = EXCLUDED.updated_at,
        item_name     = EXCLUDED.item_name,
        item_detail   = EXCLUDED.item_detail,
        is_success    = EXCLUDED.is_success,
        is_failed     = EXCLUDED.is_failed,
        is_delayed    = EXCLUDED.is_delayed";

const REFRESH_AGGREGATES: &str = "
    INSERT INTO agg_orders_minutely
        (ts_minute, success_count, failed_count, delayed_count, total_count)
    SELECT date_trunc('minute', updated_at) AS ts_minute,
           count(*) FILTER (WHERE is_success),
           count(*) FILTER (WHERE is_failed),
           count(*) FILTER (WHERE is_delayed),
           count(*)
    FROM fact_orders_monitoring
    WHERE updated_at >= $1
    GROUP BY 1
    ON CONFLICT (ts_minute) DO UPDATE SET
        success_count = EXCLUDED.success_count,
        failed_count  = EXCLUDED.failed_count,
        delayed_count = EXCLUDED.delayed_count,
        total_count   = EXCLUDED.total_count";

const SELECT_FACT: &str = "
    SELECT order_id, customer_id, customer_name, status, order_type,
           total_amount::text AS total_amount, updated_at, item_name, item_detail,
           is_success, is_failed, is_delayed, ingested_at
    FROM fact_orders_monitoring
    WHERE order_id = $1";

const SELECT_AGGREGATES: &str = "
    SELECT ts_minute, success_count, failed_count, delayed_count, total_count
    FROM agg_orders_minutely
    WHERE ts_minute >= $1
    ORDER BY ts_minute";

/// A fact row as read back from PostgreSQL.
#[derive(Debug, sqlx::FromRow)]
struct FactRecord {
    order_id: String,
    customer_id: Option<String>,
    customer_name: Option<String>,
    status: String,
    order_type: String,
    total_amount: Option<String>,
    updated_at: DateTime<Utc>,
    item_name: Option<String>,
    item_detail: Option<String>,
    is_success: bool,
    is_failed: bool,
    is_delayed: bool,
    ingested_at: DateTime<Utc>,
}

impl From<FactRecord> for FactRow {
    fn from(row: FactRecord) -> Self {
        FactRow {
            order: ClassifiedOrderRecord {
                record: NormalizedOrderRecord {
                    order_id: row.order_id,
                    customer_id: row.customer_id,
                    customer_name: row.customer_name,
                    status: OrderStatus::coerce(&row.status),
                    order_type: OrderType::coerce(&row.order_type),
                    total_amount: row.total_amount,
                    updated_at: row.updated_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                    item_name: row.item_name,
                    item_detail: row.item_detail,
                },
                flags: OrderFlags {
                    is_success: row.is_success,
                    is_failed: row.is_failed,
                    is_delayed: row.is_delayed,
                },
            },
            ingested_at: row.ingested_at,
        }
    }
}

/// PostgreSQL-backed store. Tables are created on demand, no migrations.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub async fn connect(config: &PostgresConfig) -> Result<Self, PipelineError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url())
            .await?;
        info!(host = %config.host, db = %config.database, "PostgreSQL connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn ensure_fact_table(&self) -> Result<(), PipelineError> {
        sqlx::query(CREATE_FACT_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    async fn ensure_aggregate_table(&self) -> Result<(), PipelineError> {
        sqlx::query(CREATE_AGGREGATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert_facts(&self, records: &[ClassifiedOrderRecord]) -> Result<u64, PipelineError> {
        // Parsed here rather than cast in SQL, so zone-less values are UTC whatever
        // the session time zone is. A bad timestamp rejects the batch before any write.
        let updated = records
            .iter()
            .map(|r| r.record.updated_at_utc())
            .collect::<Result<Vec<DateTime<Utc>>, _>>()
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        let mut tx = self.pool.begin().await?;
        let mut count = 0u64;

        for (r, updated_at) in records.iter().zip(updated) {
            sqlx::query(UPSERT_FACT)
                .bind(&r.record.order_id)
                .bind(&r.record.customer_id)
                .bind(&r.record.customer_name)
                .bind(r.record.status.as_str())
                .bind(r.record.order_type.as_str())
                .bind(&r.record.total_amount)
                .bind(updated_at)
                .bind(&r.record.item_name)
                .bind(&r.record.item_detail)
                .bind(r.flags.is_success)
                .bind(r.flags.is_failed)
                .bind(r.flags.is_delayed)
                .execute(&mut *tx)
                .await?;
            count += 1;
        }

        tx.commit().await?;
        debug!(rows = count, "fact upsert committed");
        Ok(count)
    }

    async fn refresh_minute_aggregates(&self, since: DateTime<Utc>) -> Result<u64, PipelineError> {
        let result = sqlx::query(REFRESH_AGGREGATES)
            .bind(since)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_fact(&self, order_id: &str) -> Result<Option<FactRow>, PipelineError> {
        let row = sqlx::query_as::<_, FactRecord>(SELECT_FACT)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(FactRow::from))
    }

    async fn aggregates_since(&self, since: DateTime<Utc>) -> Result<Vec<AggregateRow>, PipelineError> {
        let rows = sqlx::query_as::<_, (DateTime<Utc>, i64, i64, i64, i64)>(SELECT_AGGREGATES)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(ts_minute, success_count, failed_count, delayed_count, total_count)| AggregateRow {
                ts_minute,
                success_count,
                failed_count,
                delayed_count,
                total_count,
            })
            .collect())
    }

    fn backend_name(&self) -> &str {
        "postgres"
    }
}
