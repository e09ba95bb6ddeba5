//! # Kernel Errors
//!
//! Crate-wide error type. Operator-facing failures each get their own variant
//! so callers can match on the exact reason a request was refused instead of
//! parsing messages.

use crate::artifacts::ArtifactError;
use crate::config::ConfigurationError;
use crate::persistence::PersistenceError;
use crate::state_machine::{BatchStatus, StateMachineError};
use crate::transaction::TransactionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("No such job: {job_name}")]
    NoSuchJob { job_name: String },

    #[error("No such job execution: {execution_id}")]
    NoSuchJobExecution { execution_id: i64 },

    #[error("No such job instance: {reason}")]
    NoSuchJobInstance { reason: String },

    #[error("Job execution {execution_id} is already complete")]
    JobExecutionAlreadyComplete { execution_id: i64 },

    #[error(
        "Job execution {execution_id} is not the most recent execution of instance {instance_id} (most recent is {most_recent_id})"
    )]
    JobExecutionNotMostRecent {
        execution_id: i64,
        instance_id: i64,
        most_recent_id: i64,
    },

    #[error("Job execution {execution_id} is still running ({status}) and cannot be restarted")]
    JobExecutionStillRunning {
        execution_id: i64,
        status: BatchStatus,
    },

    #[error("Job execution {execution_id} is still running ({status}) and cannot be abandoned")]
    JobExecutionIsRunning {
        execution_id: i64,
        status: BatchStatus,
    },

    #[error("Job execution {execution_id} is not running ({status})")]
    JobExecutionNotRunning {
        execution_id: i64,
        status: BatchStatus,
    },

    #[error("Job execution {execution_id} cannot be restarted: {reason}")]
    JobRestart { execution_id: i64, reason: String },

    #[error("Job {job_name} cannot be started: {reason}")]
    JobStart { job_name: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateMachineError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ConfigurationError> for KernelError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl KernelError {
    /// True for the refusals the operator surface produces on bad requests,
    /// as opposed to failures of the kernel itself.
    pub fn is_operator_refusal(&self) -> bool {
        matches!(
            self,
            Self::NoSuchJob { .. }
                | Self::NoSuchJobExecution { .. }
                | Self::NoSuchJobInstance { .. }
                | Self::JobExecutionAlreadyComplete { .. }
                | Self::JobExecutionNotMostRecent { .. }
                | Self::JobExecutionStillRunning { .. }
                | Self::JobExecutionIsRunning { .. }
                | Self::JobExecutionNotRunning { .. }
                | Self::JobRestart { .. }
                | Self::JobStart { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;
