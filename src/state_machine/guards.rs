use super::states::BatchStatus;
use crate::error::KernelError;
use crate::models::JobExecution;

/// Trait for implementing operator request guards
pub trait StateGuard<T> {
    /// Check if the requested operation is allowed for the entity
    fn check(&self, entity: &T) -> Result<(), KernelError>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// Guard for `restart`: the execution must be the newest attempt of a
/// restartable job and must have ended STOPPED or FAILED
pub struct RestartGuard {
    pub most_recent_execution_id: i64,
    pub job_restartable: bool,
}

impl StateGuard<JobExecution> for RestartGuard {
    fn check(&self, execution: &JobExecution) -> Result<(), KernelError> {
        let execution_id = execution.execution_id;

        match execution.batch_status {
            BatchStatus::Completed => {
                return Err(KernelError::JobExecutionAlreadyComplete { execution_id })
            }
            BatchStatus::Abandoned => {
                return Err(KernelError::JobRestart {
                    execution_id,
                    reason: "execution was abandoned".to_string(),
                })
            }
            status if status.is_running() => {
                return Err(KernelError::JobExecutionStillRunning {
                    execution_id,
                    status,
                })
            }
            _ => {}
        }

        if self.most_recent_execution_id != execution_id {
            return Err(KernelError::JobExecutionNotMostRecent {
                execution_id,
                instance_id: execution.instance_id,
                most_recent_id: self.most_recent_execution_id,
            });
        }

        if !self.job_restartable {
            return Err(KernelError::JobRestart {
                execution_id,
                reason: format!("job {} is declared non-restartable", execution.job_name),
            });
        }

        Ok(())
    }

    fn description(&self) -> &'static str {
        "Execution must be the most recent, restartable, STOPPED or FAILED attempt"
    }
}

/// Guard for `abandon`: the execution must not be running
pub struct AbandonGuard;

impl StateGuard<JobExecution> for AbandonGuard {
    fn check(&self, execution: &JobExecution) -> Result<(), KernelError> {
        if execution.batch_status.is_running() {
            return Err(KernelError::JobExecutionIsRunning {
                execution_id: execution.execution_id,
                status: execution.batch_status,
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Execution must not be running"
    }
}

/// Guard for `stop`: the execution must still be running
pub struct StopGuard;

impl StateGuard<JobExecution> for StopGuard {
    fn check(&self, execution: &JobExecution) -> Result<(), KernelError> {
        if !execution.batch_status.is_running() {
            return Err(KernelError::JobExecutionNotRunning {
                execution_id: execution.execution_id,
                status: execution.batch_status,
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Execution must be running"
    }
}
