//! Metrics stage: batch counters pushed to a Pushgateway-style collector.
//!
//! Counters come from the classified batch itself, not from the fact table.
//! Delivery is best-effort: failures are logged and the counters are returned anyway.

use std::fmt::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use orderwatch_core::config::MetricsConfig;
use orderwatch_core::ClassifiedOrderRecord;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounters {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub delayed: u64,
}

impl BatchCounters {
    pub fn tally(records: &[ClassifiedOrderRecord]) -> Self {
        records.iter().fold(Self::default(), |mut acc, r| {
            acc.total += 1;
            acc.success += u64::from(r.flags.is_success);
            acc.failed += u64::from(r.flags.is_failed);
            acc.delayed += u64::from(r.flags.is_delayed);
            acc
        })
    }

    /// Render as text exposition, one gauge per counter.
    pub fn render(&self, prefix: &str) -> String {
        let mut out = String::new();
        for (name, value) in [
            ("total", self.total),
            ("success", self.success),
            ("failed", self.failed),
            ("delayed", self.delayed),
        ] {
            // Writing to a String cannot fail.
            let _ = writeln!(out, "# TYPE {prefix}_{name} gauge");
            let _ = writeln!(out, "{prefix}_{name} {value}");
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct MetricsPublisher {
    url: String,
    prefix: String,
    client: reqwest::Client,
}

impl MetricsPublisher {
    pub fn new(config: &MetricsConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            url: config.push_url(),
            prefix: config.prefix.clone(),
            client,
        })
    }

    /// Tally `records` and push the counters. Never fails.
    pub async fn publish(&self, records: &[ClassifiedOrderRecord]) -> BatchCounters {
        let counters = BatchCounters::tally(records);
        match self.push(counters.render(&self.prefix)).await {
            Ok(()) => debug!(url = %self.url, ?counters, "metrics pushed"),
            Err(e) => warn!(url = %self.url, error = %e, "metrics push failed, continuing"),
        }
        counters
    }

    async fn push(&self, body: String) -> Result<(), PipelineError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PipelineError::UpstreamStatus { status, body });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use orderwatch_core::{Config, NormalizedOrderRecord, OrderStatus, OrderType};

    fn batch(statuses: &[OrderStatus]) -> Vec<ClassifiedOrderRecord> {
        classify(
            statuses
                .iter()
                .enumerate()
                .map(|(i, status)| NormalizedOrderRecord {
                    order_id: format!("ORD-{i}"),
                    customer_id: None,
                    customer_name: None,
                    status: *status,
                    order_type: OrderType::Online,
                    total_amount: None,
                    updated_at: "2025-01-01T00:00:00Z".to_string(),
                    item_name: None,
                    item_detail: None,
                })
                .collect(),
        )
    }

    #[test]
    fn tally_counts_each_flag() {
        let records = batch(&[
            OrderStatus::Complete,
            OrderStatus::Closed,
            OrderStatus::Complete,
            OrderStatus::Canceled,
            OrderStatus::PendingPayment,
        ]);
        assert_eq!(
            BatchCounters::tally(&records),
            BatchCounters { total: 5, success: 3, failed: 1, delayed: 1 }
        );
    }

    #[test]
    fn renders_exposition_format() {
        let counters = BatchCounters { total: 5, success: 3, failed: 1, delayed: 1 };
        assert_eq!(
            counters.render("o2o_orders"),
            "# TYPE o2o_orders_total gauge\no2o_orders_total 5\n\
             # TYPE o2o_orders_success gauge\no2o_orders_success 3\n\
             # TYPE o2o_orders_failed gauge\no2o_orders_failed 1\n\
             # TYPE o2o_orders_delayed gauge\no2o_orders_delayed 1\n"
        );
    }

    #[tokio::test]
    async fn unreachable_sink_still_returns_counters() {
        let mut config = Config::for_profile("METRICSTEST").metrics;
        config.pushgateway_url = "http://127.0.0.1:1".to_string();
        config.timeout_secs = 1;
        let publisher = MetricsPublisher::new(&config).unwrap();

        let records = batch(&[
            OrderStatus::Complete,
            OrderStatus::Complete,
            OrderStatus::Closed,
            OrderStatus::Fraud,
            OrderStatus::Holded,
        ]);
        let counters = publisher.publish(&records).await;
        assert_eq!(counters, BatchCounters { total: 5, success: 3, failed: 1, delayed: 1 });
    }
}
