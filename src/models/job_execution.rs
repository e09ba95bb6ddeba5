//! # Job Execution
//!
//! One attempt to run a [`JobInstance`](super::JobInstance). Created by
//! `start`/`restart`; mutated only by the job controller and the operator's
//! `stop` / `abandon` requests.

use super::JobParameters;
use crate::state_machine::BatchStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub execution_id: i64,
    pub instance_id: i64,
    pub job_name: String,
    pub batch_status: BatchStatus,
    /// Explicit exit status; `None` means "same as the batch status"
    pub exit_status: Option<String>,
    pub parameters: JobParameters,
    pub create_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    /// Element a `stop` transition asked the next attempt to resume at
    pub restart_position: Option<String>,
}

impl JobExecution {
    pub fn new(
        execution_id: i64,
        instance_id: i64,
        job_name: impl Into<String>,
        parameters: JobParameters,
    ) -> Self {
        let now = Utc::now();
        Self {
            execution_id,
            instance_id,
            job_name: job_name.into(),
            batch_status: BatchStatus::Starting,
            exit_status: None,
            parameters,
            create_time: now,
            start_time: None,
            end_time: None,
            last_updated: now,
            restart_position: None,
        }
    }

    /// Exit status as reported to callers
    pub fn effective_exit_status(&self) -> String {
        self.exit_status
            .clone()
            .unwrap_or_else(|| self.batch_status.as_str().to_string())
    }

    pub fn is_running(&self) -> bool {
        self.batch_status.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_exit_status_defaults_to_batch_status() {
        let mut execution = JobExecution::new(1, 1, "job", HashMap::new());
        assert_eq!(execution.effective_exit_status(), "STARTING");

        execution.batch_status = BatchStatus::Completed;
        assert_eq!(execution.effective_exit_status(), "COMPLETED");

        execution.exit_status = Some("CUSTOM".to_string());
        assert_eq!(execution.effective_exit_status(), "CUSTOM");
    }
}
