//! The pipeline as seven independently invocable steps.
//!
//! Each step takes the upstream step's JSON output and returns its own, so an
//! external scheduler can drive the stages one at a time.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use orderwatch_core::{ClassifiedOrderRecord, Config, CoreError};

use crate::aggregate::Aggregator;
use crate::classify::classify_payload;
use crate::error::PipelineError;
use crate::fact_writer::FactWriter;
use crate::fetch::{FetchWindow, OrderFetcher};
use crate::metrics::MetricsPublisher;
use crate::normalize::normalize_payload;
use crate::payload::records_payload;
use crate::store::OrderStore;
use crate::validate::validate_payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    FetchRecent,
    ValidateRows,
    TransformEnrich,
    ClassifyFlags,
    UpsertFact,
    UpsertAgg,
    PushMetrics,
}

impl Step {
    /// Dependency order.
    pub const ALL: [Step; 7] = [
        Self::FetchRecent,
        Self::ValidateRows,
        Self::TransformEnrich,
        Self::ClassifyFlags,
        Self::UpsertFact,
        Self::UpsertAgg,
        Self::PushMetrics,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchRecent => "fetch_recent",
            Self::ValidateRows => "validate_rows",
            Self::TransformEnrich => "transform_enrich",
            Self::ClassifyFlags => "classify_flags",
            Self::UpsertFact => "upsert_fact",
            Self::UpsertAgg => "upsert_agg",
            Self::PushMetrics => "push_metrics",
        }
    }

    /// The step that must complete first. For `upsert_agg` this is an ordering
    /// dependency only; it consumes no data.
    pub fn upstream(self) -> Option<Step> {
        match self {
            Self::FetchRecent => None,
            Self::ValidateRows => Some(Self::FetchRecent),
            Self::TransformEnrich => Some(Self::ValidateRows),
            Self::ClassifyFlags => Some(Self::TransformEnrich),
            Self::UpsertFact => Some(Self::ClassifyFlags),
            Self::UpsertAgg => Some(Self::UpsertFact),
            Self::PushMetrics => Some(Self::ClassifyFlags),
        }
    }

    pub fn needs_store(self) -> bool {
        matches!(self, Self::UpsertFact | Self::UpsertAgg)
    }
}

impl FromStr for Step {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| PipelineError::UnknownStep(s.to_string()))
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs single steps. Components are built per call so pure steps need
/// neither an API key nor a database.
pub struct StepRunner {
    config: Config,
    store: Option<Arc<dyn OrderStore>>,
}

impl StepRunner {
    pub fn new(config: Config, store: Option<Arc<dyn OrderStore>>) -> Self {
        Self { config, store }
    }

    pub async fn run(&self, step: Step, input: Value) -> Result<Value, PipelineError> {
        let output = match step {
            Step::FetchRecent => {
                let fetcher = OrderFetcher::new(&self.config.oms)?;
                fetcher
                    .fetch_recent(FetchWindow::from_config(&self.config.oms))
                    .await?
            }
            Step::ValidateRows => serde_json::to_value(validate_payload(input))?,
            Step::TransformEnrich => serde_json::to_value(normalize_payload(input))?,
            Step::ClassifyFlags => serde_json::to_value(classify_payload(input))?,
            Step::UpsertFact => {
                let records: Vec<ClassifiedOrderRecord> = records_payload(input);
                Value::from(FactWriter::new(self.store()?).write(&records).await?)
            }
            Step::UpsertAgg => Value::from(Aggregator::new(self.store()?).refresh().await?),
            Step::PushMetrics => {
                let records: Vec<ClassifiedOrderRecord> = records_payload(input);
                let publisher = MetricsPublisher::new(&self.config.metrics)?;
                serde_json::to_value(publisher.publish(&records).await)?
            }
        };
        info!(step = %step, "step finished");
        Ok(output)
    }

    fn store(&self) -> Result<Arc<dyn OrderStore>, PipelineError> {
        self.store
            .clone()
            .ok_or_else(|| CoreError::Config("this step needs a database store".to_string()).into())
    }
}
