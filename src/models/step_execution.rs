//! # Step Execution
//!
//! One attempt to run one step (or one partition of a step) within a job
//! execution. Metrics and persistent user data are mutated only by the
//! owning step worker.

use super::StepMetrics;
use crate::state_machine::BatchStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_execution_id: i64,
    pub job_execution_id: i64,
    pub step_name: String,
    /// `None` for the top-level step, `Some(n)` for partition sub-executions
    pub partition: Option<u32>,
    pub batch_status: BatchStatus,
    pub exit_status: Option<String>,
    pub metrics: StepMetrics,
    pub persistent_user_data: Option<Value>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Rendered terminal error of a FAILED step
    pub failure_cause: Option<String>,
}

impl StepExecution {
    pub fn new(
        step_execution_id: i64,
        job_execution_id: i64,
        step_name: impl Into<String>,
        partition: Option<u32>,
    ) -> Self {
        Self {
            step_execution_id,
            job_execution_id,
            step_name: step_name.into(),
            partition,
            batch_status: BatchStatus::Starting,
            exit_status: None,
            metrics: StepMetrics::default(),
            persistent_user_data: None,
            start_time: None,
            end_time: None,
            failure_cause: None,
        }
    }

    /// Exit status as seen by transitions and deciders
    pub fn effective_exit_status(&self) -> String {
        self.exit_status
            .clone()
            .unwrap_or_else(|| self.batch_status.as_str().to_string())
    }
}
