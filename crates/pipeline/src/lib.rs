//! Order monitoring pipeline.
//!
//! Polls the order API for recently changed orders and moves them through
//! validation, normalization and classification, then upserts them into a fact
//! table, refreshes minute-level aggregates and pushes batch counters to a
//! metrics collector.
//!
//! - [`Pipeline`] runs every stage once
//! - [`StepRunner`] runs one named [`Step`] with JSON in and out
//! - [`scheduler::Scheduler`] triggers runs on a cron schedule with retry

pub mod aggregate;
pub mod classify;
pub mod error;
pub mod fact_writer;
pub mod fetch;
pub mod metrics;
pub mod normalize;
pub mod payload;
pub mod run;
pub mod scheduler;
pub mod steps;
pub mod store;
pub mod validate;

pub use error::PipelineError;
pub use metrics::BatchCounters;
pub use run::{Pipeline, RunReport};
pub use steps::{Step, StepRunner};
pub use store::{MemoryOrderStore, OrderStore, PgOrderStore};
