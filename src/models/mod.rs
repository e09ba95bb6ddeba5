//! # Domain Records
//!
//! Plain records persisted through the [`crate::persistence::JobRepository`]:
//! job instances, job executions, step executions with their metrics,
//! checkpoints and partition plans.

pub mod checkpoint;
pub mod job_execution;
pub mod job_instance;
pub mod metrics;
pub mod partition;
pub mod step_execution;

use std::collections::HashMap;

/// Runtime parameters submitted with `start` / `restart`
pub type JobParameters = HashMap<String, String>;

/// Resolved property bag handed to artifacts
pub type Properties = HashMap<String, String>;

pub use checkpoint::{Checkpoint, CheckpointKey};
pub use job_execution::JobExecution;
pub use job_instance::JobInstance;
pub use metrics::{MetricType, StepMetrics};
pub use partition::PartitionPlan;
pub use step_execution::StepExecution;
