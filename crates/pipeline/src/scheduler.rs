//! Cron-driven trigger for pipeline runs.
//!
//! Runs execute inline in the scheduler loop, so two runs never overlap. Fire
//! times that pass while a run is in progress are skipped, not replayed. A
//! failed run is retried from the start according to [`RetryPolicy`].

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use orderwatch_core::config::ScheduleConfig;
use orderwatch_core::CoreError;

use crate::error::PipelineError;
use crate::run::{Pipeline, RunReport};

/// Whole-run retry with a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self {
            retries: config.retries,
            delay: Duration::from_secs(config.retry_delay_secs),
        }
    }
}

/// Call `attempt` until it succeeds, retrying retryable failures up to
/// `policy.retries` times. Non-retryable errors are returned immediately.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut retried = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && retried < policy.retries => {
                retried += 1;
                warn!(
                    error = %e,
                    retry = retried,
                    of = policy.retries,
                    delay_secs = policy.delay.as_secs(),
                    "pipeline run failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Parse a cron expression, auto-prepending "0 " for 5-field expressions.
///
/// The `cron` crate requires 6 fields (sec min hr dom mon dow), but schedules
/// are usually written with 5 (min hr dom mon dow).
pub fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() == 5 {
        let six_field = format!("0 {}", expr);
        Schedule::from_str(&six_field)
    } else {
        Schedule::from_str(expr)
    }
}

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    schedule: Schedule,
    policy: RetryPolicy,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, config: &ScheduleConfig) -> Result<Self, PipelineError> {
        let schedule = parse_cron(&config.cron).map_err(|e| {
            CoreError::Config(format!("invalid PIPELINE_CRON '{}': {}", config.cron, e))
        })?;
        Ok(Self {
            pipeline,
            schedule,
            policy: RetryPolicy::from_config(config),
        })
    }

    /// A single run with the retry policy applied.
    pub async fn run_now(&self) -> Result<RunReport, PipelineError> {
        run_with_retry(&self.policy, || self.pipeline.run_once()).await
    }

    /// Loop until `shutdown` is notified. Shutdown is observed between runs only.
    pub async fn run(&self, shutdown: Arc<Notify>) {
        info!(retries = self.policy.retries, "pipeline scheduler started");

        loop {
            let Some(next_fire) = self.schedule.upcoming(Utc).next() else {
                warn!("schedule has no upcoming fire time, stopping");
                return;
            };
            let wait = (next_fire - Utc::now()).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.notified() => {
                    info!("pipeline scheduler stopping");
                    return;
                }
            }

            if let Err(e) = self.run_now().await {
                error!(
                    error = %e,
                    retryable = e.is_retryable(),
                    "pipeline run failed, needs attention"
                );
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
