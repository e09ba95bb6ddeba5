//! # Execution Contexts
//!
//! Mutable views of the running job and step handed to user artifacts.
//! Artifacts communicate back to the kernel through them: exit status
//! overrides and persistent user data.

use crate::models::{JobParameters, Properties, StepMetrics};
use crate::state_machine::BatchStatus;
use serde_json::Value;

/// Job-scoped context seen by job listeners
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_name: String,
    pub instance_id: i64,
    pub execution_id: i64,
    pub batch_status: BatchStatus,
    pub exit_status: Option<String>,
    pub properties: Properties,
    pub parameters: JobParameters,
    pub transient_user_data: Option<Value>,
}

impl JobContext {
    pub fn set_exit_status(&mut self, exit_status: impl Into<String>) {
        self.exit_status = Some(exit_status.into());
    }

    pub fn exit_status(&self) -> String {
        self.exit_status
            .clone()
            .unwrap_or_else(|| self.batch_status.as_str().to_string())
    }
}

/// Step-scoped context seen by step artifacts and listeners
#[derive(Debug, Clone)]
pub struct StepContext {
    pub step_name: String,
    pub step_execution_id: i64,
    pub job_execution_id: i64,
    pub instance_id: i64,
    pub partition: Option<u32>,
    pub batch_status: BatchStatus,
    pub exit_status: Option<String>,
    /// Step properties with substitutions applied
    pub properties: Properties,
    pub parameters: JobParameters,
    /// Survives restarts of the same step; persisted at every chunk commit
    pub persistent_user_data: Option<Value>,
    pub transient_user_data: Option<Value>,
    /// Snapshot of the step's counters at the last chunk boundary
    pub metrics: StepMetrics,
    /// Rendered error that failed the step, if any
    pub exception: Option<String>,
}

impl StepContext {
    pub fn set_exit_status(&mut self, exit_status: impl Into<String>) {
        self.exit_status = Some(exit_status.into());
    }

    pub fn exit_status(&self) -> String {
        self.exit_status
            .clone()
            .unwrap_or_else(|| self.batch_status.as_str().to_string())
    }

    pub fn set_persistent_user_data(&mut self, data: Value) {
        self.persistent_user_data = Some(data);
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}
