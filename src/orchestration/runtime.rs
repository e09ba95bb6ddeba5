//! # Execution Runtime
//!
//! Per-execution state shared by the job controller and every step it runs,
//! plus the per-step scope handed to batchlet, chunk and partition bodies.

use crate::artifacts::{ListenerSet, StepContext};
use crate::error::Result;
use crate::events::LifecycleEvent;
use crate::execution::StopToken;
use crate::job::{ArtifactRef, JobDefinition, PropertyResolver, StepDefinition};
use crate::models::{CheckpointKey, JobExecution, JobParameters, Properties, StepExecution};
use crate::orchestration::partition::PartitionSink;
use crate::state_machine::BatchStatus;
use crate::system_context::KernelContext;
use crate::transaction::TransactionManager;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Everything a running job execution needs, shared by reference count with
/// its steps and partitions
pub struct JobRuntime {
    pub services: Arc<KernelContext>,
    pub job: Arc<JobDefinition>,
    pub instance_id: i64,
    pub execution_id: i64,
    pub parameters: JobParameters,
    pub properties: PropertyResolver,
    pub stop: StopToken,
    /// Execution this one restarts, if any
    pub restart_of: Option<i64>,
    /// Element recorded by a `stop` transition of the restarted execution
    pub restart_position: Option<String>,
}

impl JobRuntime {
    pub fn new(
        services: Arc<KernelContext>,
        job: Arc<JobDefinition>,
        execution: &JobExecution,
        restart_of: Option<&JobExecution>,
        stop: StopToken,
    ) -> Self {
        let properties = PropertyResolver::new(execution.parameters.clone(), &job.properties);
        Self {
            services,
            job,
            instance_id: execution.instance_id,
            execution_id: execution.execution_id,
            parameters: execution.parameters.clone(),
            properties,
            stop,
            restart_of: restart_of.map(|previous| previous.execution_id),
            restart_position: restart_of.and_then(|previous| previous.restart_position.clone()),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job.id
    }

    /// Publish a job-scoped lifecycle event
    pub fn publish(&self, name: &str, payload: Value) {
        let event = LifecycleEvent::for_job(name, self.execution_id, payload);
        if let Err(e) = self.services.event_publisher.publish(event) {
            debug!(execution_id = self.execution_id, event = name, error = %e, "Event dropped");
        }
    }
}

/// How a step body ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Stopped,
    Failed(String),
}

impl StepOutcome {
    pub fn batch_status(&self) -> BatchStatus {
        match self {
            Self::Completed => BatchStatus::Completed,
            Self::Stopped => BatchStatus::Stopped,
            Self::Failed(_) => BatchStatus::Failed,
        }
    }
}

/// Working set of one step (or partition) execution
pub struct StepScope {
    pub runtime: Arc<JobRuntime>,
    pub step: Arc<StepDefinition>,
    pub execution: StepExecution,
    pub context: StepContext,
    /// Resolver that also sees the partition plan properties, if any
    pub properties: PropertyResolver,
    pub step_properties: Properties,
    pub listeners: ListenerSet,
    pub checkpoint_key: CheckpointKey,
    pub stop: StopToken,
    pub transaction: Arc<dyn TransactionManager>,
    pub sink: Option<PartitionSink>,
    /// Status the previous attempt of this step ended with
    pub previous_status: Option<BatchStatus>,
}

impl StepScope {
    /// Resolve an artifact reference against this step's properties
    pub fn resolve(&self, artifact: &ArtifactRef) -> ArtifactRef {
        self.properties.resolve_ref(artifact, &self.step_properties)
    }

    /// Write the step execution, folding in what artifacts put on the context
    pub async fn persist(&mut self) -> Result<()> {
        self.execution.persistent_user_data = self.context.persistent_user_data.clone();
        self.context.metrics = self.execution.metrics;
        self.runtime
            .services
            .repository
            .update_step_execution(&self.execution)
            .await?;
        Ok(())
    }

    /// Publish a step-scoped lifecycle event
    pub fn publish(&self, name: &str, payload: Value) {
        let event = LifecycleEvent::for_step(
            name,
            self.execution.job_execution_id,
            &self.execution.step_name,
            self.execution.partition,
            payload,
        );
        if let Err(e) = self.runtime.services.event_publisher.publish(event) {
            debug!(
                step_name = %self.execution.step_name,
                event = name,
                error = %e,
                "Event dropped"
            );
        }
    }

    pub fn is_partition(&self) -> bool {
        self.execution.partition.is_some()
    }
}
