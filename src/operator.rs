//! # Job Operator
//!
//! Programmatic entry point to the kernel. `start` and `restart` persist the
//! new execution and hand it to a [`JobController`] on its own tokio task,
//! returning as soon as the execution id is known. `stop` and `abandon` act
//! on the persisted status with compare-and-set updates so they never race
//! the controller into an illegal transition.
//!
//! ```rust,no_run
//! use batch_kernel::operator::JobOperator;
//! use batch_kernel::system_context::KernelContext;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # async fn example() -> batch_kernel::Result<()> {
//! let operator = JobOperator::new(Arc::new(KernelContext::builder().build()?));
//! let execution_id = operator.start("nightly-export", HashMap::new()).await?;
//! let finished = operator.wait_for(execution_id).await?;
//! println!("{} ended {}", finished.job_name, finished.batch_status);
//! # Ok(())
//! # }
//! ```

use crate::error::{KernelError, Result};
use crate::execution::{CompletionRegistry, StopToken};
use crate::job::{validate_job, JobDefinition};
use crate::logging::{log_error, log_job_operation};
use crate::models::{JobExecution, JobInstance, JobParameters, StepExecution};
use crate::orchestration::{JobController, JobRuntime};
use crate::state_machine::{
    AbandonGuard, BatchStatus, JobEvent, JobStateMachine, JobSubject, RestartGuard, StateGuard,
    StopGuard,
};
use crate::system_context::KernelContext;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const RUNNING_STATUSES: [BatchStatus; 2] = [BatchStatus::Starting, BatchStatus::Started];
const TERMINAL_STATUSES: [BatchStatus; 3] =
    [BatchStatus::Completed, BatchStatus::Failed, BatchStatus::Stopped];

#[derive(Clone)]
pub struct JobOperator {
    services: Arc<KernelContext>,
    completions: Arc<CompletionRegistry>,
    running: Arc<DashMap<i64, StopToken>>,
}

impl std::fmt::Debug for JobOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOperator")
            .field("kernel_id", &self.services.kernel_id)
            .field("running", &self.running.len())
            .finish()
    }
}

impl JobOperator {
    pub fn new(services: Arc<KernelContext>) -> Self {
        Self {
            services,
            completions: Arc::new(CompletionRegistry::new()),
            running: Arc::new(DashMap::new()),
        }
    }

    pub fn services(&self) -> &Arc<KernelContext> {
        &self.services
    }

    /// Create a new instance of `job_name` and run it
    #[instrument(skip(self, parameters))]
    pub async fn start(&self, job_name: &str, parameters: JobParameters) -> Result<i64> {
        let job = self.job_definition(job_name)?;
        validate_job(&job, self.services.artifacts.as_ref()).map_err(|e| KernelError::JobStart {
            job_name: job_name.to_string(),
            reason: e.to_string(),
        })?;

        let repository = &self.services.repository;
        let instance = repository.create_job_instance(job_name).await?;
        let execution = repository
            .create_job_execution(instance.instance_id, parameters)
            .await?;

        log_job_operation(
            "submit",
            Some(execution.execution_id),
            Some(job_name),
            BatchStatus::Starting.as_str(),
            None,
        );
        Ok(self.launch(job, execution, None))
    }

    /// Run a new execution of the instance that `execution_id` belongs to
    #[instrument(skip(self, parameters))]
    pub async fn restart(&self, execution_id: i64, parameters: JobParameters) -> Result<i64> {
        let repository = &self.services.repository;
        let previous = self.job_execution(execution_id).await?;

        let instance = repository
            .job_instance(previous.instance_id)
            .await?
            .ok_or_else(|| KernelError::NoSuchJobInstance {
                reason: format!(
                    "instance {} of execution {execution_id} does not exist",
                    previous.instance_id
                ),
            })?;
        let job = self.job_definition(&instance.job_name)?;

        let most_recent = repository
            .most_recent_execution(instance.instance_id)
            .await?
            .map_or(execution_id, |latest| latest.execution_id);
        RestartGuard {
            most_recent_execution_id: most_recent,
            job_restartable: job.restartable,
        }
        .check(&previous)?;

        validate_job(&job, self.services.artifacts.as_ref()).map_err(|e| KernelError::JobRestart {
            execution_id,
            reason: e.to_string(),
        })?;

        let execution = repository
            .create_job_execution(instance.instance_id, parameters)
            .await?;

        log_job_operation(
            "restart",
            Some(execution.execution_id),
            Some(&instance.job_name),
            BatchStatus::Starting.as_str(),
            Some(&format!("restarting execution {execution_id}")),
        );
        Ok(self.launch(job, execution, Some(previous)))
    }

    /// Ask a running execution to stop at its next safe boundary
    #[instrument(skip(self))]
    pub async fn stop(&self, execution_id: i64) -> Result<()> {
        let execution = self.job_execution(execution_id).await?;
        StopGuard.check(&execution)?;

        let stopping = self
            .services
            .repository
            .update_job_status(execution_id, &RUNNING_STATUSES, BatchStatus::Stopping)
            .await?;

        if stopping.is_none() {
            // Raced with the controller or another stop
            let current = self.job_execution(execution_id).await?;
            if current.batch_status != BatchStatus::Stopping {
                return Err(KernelError::JobExecutionNotRunning {
                    execution_id,
                    status: current.batch_status,
                });
            }
        }

        match self.running.get(&execution_id) {
            Some(token) => token.request_stop(),
            None => debug!(execution_id, "No local controller for stopped execution"),
        }

        log_job_operation(
            "stop",
            Some(execution_id),
            Some(&execution.job_name),
            BatchStatus::Stopping.as_str(),
            None,
        );
        Ok(())
    }

    /// Mark a finished execution ABANDONED so it can never be restarted
    #[instrument(skip(self))]
    pub async fn abandon(&self, execution_id: i64) -> Result<()> {
        let execution = self.job_execution(execution_id).await?;
        AbandonGuard.check(&execution)?;

        let abandoned = self
            .services
            .repository
            .update_job_status(execution_id, &TERMINAL_STATUSES, BatchStatus::Abandoned)
            .await?;

        let Some(abandoned) = abandoned else {
            let current = self.job_execution(execution_id).await?;
            if current.batch_status == BatchStatus::Abandoned {
                return Ok(());
            }
            return Err(KernelError::JobExecutionIsRunning {
                execution_id,
                status: current.batch_status,
            });
        };

        let mut machine = JobStateMachine::new(
            JobSubject {
                execution_id,
                job_name: abandoned.job_name.clone(),
            },
            execution.batch_status,
            self.services.event_publisher.clone(),
        );
        machine.transition(&JobEvent::Abandon)?;

        log_job_operation(
            "abandon",
            Some(execution_id),
            Some(&abandoned.job_name),
            BatchStatus::Abandoned.as_str(),
            None,
        );
        Ok(())
    }

    /// Wait until the execution reaches a terminal status
    pub async fn wait_for(&self, execution_id: i64) -> Result<JobExecution> {
        self.completions
            .wait(
                execution_id,
                self.services.repository.as_ref(),
                self.services.config.poll_interval(),
            )
            .await
    }

    /// Like [`wait_for`](Self::wait_for), giving up after `timeout`
    pub async fn wait_for_timeout(
        &self,
        execution_id: i64,
        timeout: Duration,
    ) -> Result<Option<JobExecution>> {
        match tokio::time::timeout(timeout, self.wait_for(execution_id)).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    // Queries

    pub async fn job_names(&self) -> Result<Vec<String>> {
        Ok(self.services.repository.job_names().await?)
    }

    pub async fn job_instance_count(&self, job_name: &str) -> Result<usize> {
        let count = self.services.repository.job_instance_count(job_name).await?;
        if count == 0 {
            return Err(KernelError::NoSuchJob {
                job_name: job_name.to_string(),
            });
        }
        Ok(count)
    }

    /// Instances of `job_name`, most recent first
    pub async fn job_instances(
        &self,
        job_name: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<JobInstance>> {
        self.job_instance_count(job_name).await?;
        Ok(self
            .services
            .repository
            .job_instances(job_name, start, count)
            .await?)
    }

    pub async fn running_executions(&self, job_name: &str) -> Result<Vec<i64>> {
        self.job_instance_count(job_name).await?;
        Ok(self.services.repository.running_executions(job_name).await?)
    }

    pub async fn parameters(&self, execution_id: i64) -> Result<JobParameters> {
        Ok(self.job_execution(execution_id).await?.parameters)
    }

    pub async fn job_instance(&self, execution_id: i64) -> Result<JobInstance> {
        let execution = self.job_execution(execution_id).await?;
        self.services
            .repository
            .job_instance(execution.instance_id)
            .await?
            .ok_or_else(|| KernelError::NoSuchJobInstance {
                reason: format!("no instance for execution {execution_id}"),
            })
    }

    /// Every execution of the instance, oldest first
    pub async fn job_executions(&self, instance_id: i64) -> Result<Vec<JobExecution>> {
        let repository = &self.services.repository;
        if repository.job_instance(instance_id).await?.is_none() {
            return Err(KernelError::NoSuchJobInstance {
                reason: format!("instance {instance_id} does not exist"),
            });
        }
        Ok(repository.job_executions(instance_id).await?)
    }

    pub async fn job_execution(&self, execution_id: i64) -> Result<JobExecution> {
        self.services
            .repository
            .job_execution(execution_id)
            .await?
            .ok_or(KernelError::NoSuchJobExecution { execution_id })
    }

    pub async fn step_executions(&self, execution_id: i64) -> Result<Vec<StepExecution>> {
        self.job_execution(execution_id).await?;
        Ok(self.services.repository.step_executions(execution_id).await?)
    }

    fn job_definition(&self, job_name: &str) -> Result<Arc<JobDefinition>> {
        self.services
            .job_definitions
            .job_definition(job_name)
            .ok_or_else(|| KernelError::NoSuchJob {
                job_name: job_name.to_string(),
            })
    }

    fn launch(
        &self,
        job: Arc<JobDefinition>,
        execution: JobExecution,
        restart_of: Option<JobExecution>,
    ) -> i64 {
        let execution_id = execution.execution_id;
        let stop = StopToken::new();
        self.completions.register(execution_id);
        self.running.insert(execution_id, stop.clone());

        let runtime = Arc::new(JobRuntime::new(
            self.services.clone(),
            job,
            &execution,
            restart_of.as_ref(),
            stop,
        ));

        let services = self.services.clone();
        let completions = self.completions.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            // The inner task isolates panics in user artifacts from bookkeeping
            let controller = tokio::spawn(JobController::new(runtime).run());
            let context = format!("execution {execution_id}");

            let status = match controller.await {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => {
                    log_error("job_operator", "run", &e.to_string(), Some(&context));
                    mark_failed(&services, execution_id).await
                }
                Err(e) => {
                    let error = format!("controller task aborted: {e}");
                    log_error("job_operator", "run", &error, Some(&context));
                    mark_failed(&services, execution_id).await
                }
            };

            running.remove(&execution_id);
            completions.complete(execution_id, status);
            info!(execution_id, status = %status, "🏁 Job execution finished");
        });

        execution_id
    }
}

/// Force a non-terminal execution to FAILED after its controller died
async fn mark_failed(services: &KernelContext, execution_id: i64) -> BatchStatus {
    let expected = [
        BatchStatus::Starting,
        BatchStatus::Started,
        BatchStatus::Stopping,
    ];
    match services
        .repository
        .update_job_status(execution_id, &expected, BatchStatus::Failed)
        .await
    {
        Ok(Some(_)) => BatchStatus::Failed,
        Ok(None) => services
            .repository
            .job_execution(execution_id)
            .await
            .ok()
            .flatten()
            .map_or(BatchStatus::Failed, |execution| execution.batch_status),
        Err(e) => {
            warn!(execution_id, error = %e, "Could not record failed execution");
            BatchStatus::Failed
        }
    }
}
