//! In-memory [`JobRepository`].
//!
//! All state sits behind one `parking_lot::RwLock`, so concurrent writers
//! from sibling partitions are serialized. Checkpoints are stored as JSON
//! blobs to mirror what a durable store would hold.

use super::errors::{PersistenceError, PersistenceResult};
use super::repository::JobRepository;
use crate::models::{
    Checkpoint, CheckpointKey, JobExecution, JobInstance, JobParameters, StepExecution,
};
use crate::state_machine::BatchStatus;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Default)]
struct RepositoryState {
    next_instance_id: i64,
    next_execution_id: i64,
    next_step_execution_id: i64,
    instances: BTreeMap<i64, JobInstance>,
    executions: BTreeMap<i64, JobExecution>,
    step_executions: BTreeMap<i64, StepExecution>,
    checkpoints: HashMap<CheckpointKey, Vec<u8>>,
}

impl RepositoryState {
    fn execution_ids_of(&self, instance_id: i64) -> BTreeSet<i64> {
        self.executions
            .values()
            .filter(|e| e.instance_id == instance_id)
            .map(|e| e.execution_id)
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    state: RwLock<RepositoryState>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create_job_instance(&self, job_name: &str) -> PersistenceResult<JobInstance> {
        let mut state = self.state.write();
        state.next_instance_id += 1;
        let instance = JobInstance {
            instance_id: state.next_instance_id,
            job_name: job_name.to_string(),
        };
        state.instances.insert(instance.instance_id, instance.clone());
        Ok(instance)
    }

    async fn job_instance(&self, instance_id: i64) -> PersistenceResult<Option<JobInstance>> {
        Ok(self.state.read().instances.get(&instance_id).cloned())
    }

    async fn job_names(&self) -> PersistenceResult<Vec<String>> {
        let names: BTreeSet<String> = self
            .state
            .read()
            .instances
            .values()
            .map(|i| i.job_name.clone())
            .collect();
        Ok(names.into_iter().collect())
    }

    async fn job_instance_count(&self, job_name: &str) -> PersistenceResult<usize> {
        Ok(self
            .state
            .read()
            .instances
            .values()
            .filter(|i| i.job_name == job_name)
            .count())
    }

    async fn job_instances(
        &self,
        job_name: &str,
        start: usize,
        count: usize,
    ) -> PersistenceResult<Vec<JobInstance>> {
        Ok(self
            .state
            .read()
            .instances
            .values()
            .rev()
            .filter(|i| i.job_name == job_name)
            .skip(start)
            .take(count)
            .cloned()
            .collect())
    }

    async fn create_job_execution(
        &self,
        instance_id: i64,
        parameters: JobParameters,
    ) -> PersistenceResult<JobExecution> {
        let mut state = self.state.write();
        let job_name = state
            .instances
            .get(&instance_id)
            .map(|i| i.job_name.clone())
            .ok_or_else(|| PersistenceError::not_found("job instance", instance_id))?;

        state.next_execution_id += 1;
        let execution = JobExecution::new(state.next_execution_id, instance_id, job_name, parameters);
        state
            .executions
            .insert(execution.execution_id, execution.clone());
        Ok(execution)
    }

    async fn job_execution(&self, execution_id: i64) -> PersistenceResult<Option<JobExecution>> {
        Ok(self.state.read().executions.get(&execution_id).cloned())
    }

    async fn job_executions(&self, instance_id: i64) -> PersistenceResult<Vec<JobExecution>> {
        Ok(self
            .state
            .read()
            .executions
            .values()
            .filter(|e| e.instance_id == instance_id)
            .cloned()
            .collect())
    }

    async fn update_job_execution(&self, execution: &JobExecution) -> PersistenceResult<()> {
        let mut state = self.state.write();
        let stored = state
            .executions
            .get_mut(&execution.execution_id)
            .ok_or_else(|| PersistenceError::not_found("job execution", execution.execution_id))?;
        *stored = execution.clone();
        stored.last_updated = Utc::now();
        Ok(())
    }

    async fn update_job_status(
        &self,
        execution_id: i64,
        expected: &[BatchStatus],
        to: BatchStatus,
    ) -> PersistenceResult<Option<JobExecution>> {
        let mut state = self.state.write();
        let stored = state
            .executions
            .get_mut(&execution_id)
            .ok_or_else(|| PersistenceError::not_found("job execution", execution_id))?;

        if !expected.contains(&stored.batch_status) {
            return Ok(None);
        }

        let now = Utc::now();
        stored.batch_status = to;
        stored.last_updated = now;
        if to == BatchStatus::Started && stored.start_time.is_none() {
            stored.start_time = Some(now);
        }
        if to.is_terminal() && stored.end_time.is_none() {
            stored.end_time = Some(now);
        }
        Ok(Some(stored.clone()))
    }

    async fn running_executions(&self, job_name: &str) -> PersistenceResult<Vec<i64>> {
        Ok(self
            .state
            .read()
            .executions
            .values()
            .filter(|e| e.job_name == job_name && e.batch_status.is_running())
            .map(|e| e.execution_id)
            .collect())
    }

    async fn create_step_execution(
        &self,
        job_execution_id: i64,
        step_name: &str,
        partition: Option<u32>,
    ) -> PersistenceResult<StepExecution> {
        let mut state = self.state.write();
        if !state.executions.contains_key(&job_execution_id) {
            return Err(PersistenceError::not_found("job execution", job_execution_id));
        }

        state.next_step_execution_id += 1;
        let step = StepExecution::new(
            state.next_step_execution_id,
            job_execution_id,
            step_name,
            partition,
        );
        state
            .step_executions
            .insert(step.step_execution_id, step.clone());
        Ok(step)
    }

    async fn update_step_execution(&self, step: &StepExecution) -> PersistenceResult<()> {
        let mut state = self.state.write();
        let stored = state
            .step_executions
            .get_mut(&step.step_execution_id)
            .ok_or_else(|| PersistenceError::not_found("step execution", step.step_execution_id))?;
        *stored = step.clone();
        Ok(())
    }

    async fn step_executions(
        &self,
        job_execution_id: i64,
    ) -> PersistenceResult<Vec<StepExecution>> {
        Ok(self
            .state
            .read()
            .step_executions
            .values()
            .filter(|s| s.job_execution_id == job_execution_id && s.partition.is_none())
            .cloned()
            .collect())
    }

    async fn partition_step_executions(
        &self,
        job_execution_id: i64,
        step_name: &str,
    ) -> PersistenceResult<Vec<StepExecution>> {
        Ok(self
            .state
            .read()
            .step_executions
            .values()
            .filter(|s| {
                s.job_execution_id == job_execution_id
                    && s.step_name == step_name
                    && s.partition.is_some()
            })
            .cloned()
            .collect())
    }

    async fn last_step_execution(
        &self,
        instance_id: i64,
        step_name: &str,
        partition: Option<u32>,
    ) -> PersistenceResult<Option<StepExecution>> {
        let state = self.state.read();
        let executions = state.execution_ids_of(instance_id);
        Ok(state
            .step_executions
            .values()
            .rev()
            .find(|s| {
                executions.contains(&s.job_execution_id)
                    && s.step_name == step_name
                    && s.partition == partition
            })
            .cloned())
    }

    async fn step_start_count(&self, instance_id: i64, step_name: &str) -> PersistenceResult<u32> {
        let state = self.state.read();
        let executions = state.execution_ids_of(instance_id);
        let count = state
            .step_executions
            .values()
            .filter(|s| {
                executions.contains(&s.job_execution_id)
                    && s.step_name == step_name
                    && s.partition.is_none()
            })
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn save_checkpoint(
        &self,
        key: &CheckpointKey,
        checkpoint: &Checkpoint,
    ) -> PersistenceResult<()> {
        let blob = serde_json::to_vec(checkpoint)?;
        self.state.write().checkpoints.insert(key.clone(), blob);
        Ok(())
    }

    async fn load_checkpoint(&self, key: &CheckpointKey) -> PersistenceResult<Option<Checkpoint>> {
        let state = self.state.read();
        match state.checkpoints.get(key) {
            Some(blob) => Ok(Some(serde_json::from_slice(blob)?)),
            None => Ok(None),
        }
    }

    async fn remove_checkpoint(&self, key: &CheckpointKey) -> PersistenceResult<()> {
        self.state.write().checkpoints.remove(key);
        Ok(())
    }
}
