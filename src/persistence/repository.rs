use super::errors::PersistenceResult;
use crate::models::{
    Checkpoint, CheckpointKey, JobExecution, JobInstance, JobParameters, StepExecution,
};
use crate::state_machine::BatchStatus;
use async_trait::async_trait;

/// Durable store for job instances, executions, step executions and
/// checkpoints
///
/// Implementations must serialize concurrent writes: sibling partitions of the
/// same job execution update their step executions and checkpoints in
/// parallel.
#[async_trait]
pub trait JobRepository: Send + Sync {
    // Job instances

    async fn create_job_instance(&self, job_name: &str) -> PersistenceResult<JobInstance>;

    async fn job_instance(&self, instance_id: i64) -> PersistenceResult<Option<JobInstance>>;

    /// Distinct names of every job that has at least one instance, sorted
    async fn job_names(&self) -> PersistenceResult<Vec<String>>;

    async fn job_instance_count(&self, job_name: &str) -> PersistenceResult<usize>;

    /// Instances of `job_name`, most recent first, paged by `start`/`count`
    async fn job_instances(
        &self,
        job_name: &str,
        start: usize,
        count: usize,
    ) -> PersistenceResult<Vec<JobInstance>>;

    // Job executions

    async fn create_job_execution(
        &self,
        instance_id: i64,
        parameters: JobParameters,
    ) -> PersistenceResult<JobExecution>;

    async fn job_execution(&self, execution_id: i64) -> PersistenceResult<Option<JobExecution>>;

    /// Every execution of the instance, oldest first
    async fn job_executions(&self, instance_id: i64) -> PersistenceResult<Vec<JobExecution>>;

    async fn update_job_execution(&self, execution: &JobExecution) -> PersistenceResult<()>;

    /// Atomically move the execution to `to` if its current status is one of
    /// `expected`. Returns the updated record, or `None` when the status did
    /// not match. Stamps `start_time` on the first move to STARTED and
    /// `end_time` on the first move to a terminal status.
    async fn update_job_status(
        &self,
        execution_id: i64,
        expected: &[BatchStatus],
        to: BatchStatus,
    ) -> PersistenceResult<Option<JobExecution>>;

    /// Ids of the executions of `job_name` that are still running
    async fn running_executions(&self, job_name: &str) -> PersistenceResult<Vec<i64>>;

    async fn most_recent_execution(
        &self,
        instance_id: i64,
    ) -> PersistenceResult<Option<JobExecution>> {
        Ok(self.job_executions(instance_id).await?.pop())
    }

    // Step executions

    async fn create_step_execution(
        &self,
        job_execution_id: i64,
        step_name: &str,
        partition: Option<u32>,
    ) -> PersistenceResult<StepExecution>;

    async fn update_step_execution(&self, step: &StepExecution) -> PersistenceResult<()>;

    /// Top-level step executions of a job execution, in creation order
    async fn step_executions(&self, job_execution_id: i64)
        -> PersistenceResult<Vec<StepExecution>>;

    /// Partition sub-executions of one step within a job execution
    async fn partition_step_executions(
        &self,
        job_execution_id: i64,
        step_name: &str,
    ) -> PersistenceResult<Vec<StepExecution>>;

    /// Latest execution of a step (or partition) across every attempt of the
    /// instance
    async fn last_step_execution(
        &self,
        instance_id: i64,
        step_name: &str,
        partition: Option<u32>,
    ) -> PersistenceResult<Option<StepExecution>>;

    /// Number of times the top-level step has been started for the instance
    async fn step_start_count(&self, instance_id: i64, step_name: &str) -> PersistenceResult<u32>;

    // Checkpoints

    async fn save_checkpoint(
        &self,
        key: &CheckpointKey,
        checkpoint: &Checkpoint,
    ) -> PersistenceResult<()>;

    async fn load_checkpoint(&self, key: &CheckpointKey) -> PersistenceResult<Option<Checkpoint>>;

    async fn remove_checkpoint(&self, key: &CheckpointKey) -> PersistenceResult<()>;
}
