//! # Step Controller
//!
//! Drives one step (or one partition of a step) from STARTING to a terminal
//! status: creates and persists the step execution, runs the step listeners
//! around the body and records the outcome. Transition evaluation is left to
//! the job controller.

use crate::artifacts::{ListenerSet, StepContext};
use crate::error::Result;
use crate::execution::StopToken;
use crate::job::{ArtifactRef, PropertyResolver, StepBody, StepDefinition};
use crate::logging::log_step_operation;
use crate::models::{CheckpointKey, Properties, StepExecution};
use crate::orchestration::batchlet_step;
use crate::orchestration::chunk::ChunkProcessor;
use crate::orchestration::partition::{PartitionCoordinator, PartitionMessage, PartitionSink};
use crate::orchestration::runtime::{JobRuntime, StepOutcome, StepScope};
use crate::state_machine::{BatchStatus, StepEvent, StepStateMachine, StepSubject};
use crate::transaction::TransactionScope;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Work order for one partition of a partitioned step
pub struct PartitionAssignment {
    pub partition: u32,
    pub properties: Properties,
    pub stop: StopToken,
    pub sender: mpsc::UnboundedSender<PartitionMessage>,
    pub collector: Option<ArtifactRef>,
    /// Last execution of this partition in an earlier attempt
    pub previous: Option<StepExecution>,
}

#[derive(Clone)]
pub struct StepController {
    runtime: Arc<JobRuntime>,
    step: Arc<StepDefinition>,
}

impl StepController {
    pub fn new(runtime: Arc<JobRuntime>, step: Arc<StepDefinition>) -> Self {
        Self { runtime, step }
    }

    /// Run a top-level step; `previous` is the step's last execution in an
    /// earlier attempt of the job instance
    pub async fn execute(&self, previous: Option<&StepExecution>) -> Result<StepExecution> {
        let scope = self
            .prepare(
                None,
                self.runtime.properties.clone(),
                self.runtime.stop.clone(),
                previous,
            )
            .await?;
        self.run(scope, None).await
    }

    /// Run one partition of this step
    pub fn execute_partition(
        &self,
        assignment: PartitionAssignment,
    ) -> BoxFuture<'static, Result<StepExecution>> {
        let controller = self.clone();
        async move {
            let PartitionAssignment {
                partition,
                properties,
                stop,
                sender,
                collector,
                previous,
            } = assignment;

            let resolver = controller.runtime.properties.for_partition(properties);
            let mut scope = controller
                .prepare(Some(partition), resolver, stop, previous.as_ref())
                .await?;
            scope.sink = Some(PartitionSink::new(partition, sender, None));
            controller.run(scope, collector).await
        }
        .boxed()
    }

    async fn prepare(
        &self,
        partition: Option<u32>,
        properties: PropertyResolver,
        stop: StopToken,
        previous: Option<&StepExecution>,
    ) -> Result<StepScope> {
        let services = &self.runtime.services;
        let execution = services
            .repository
            .create_step_execution(self.runtime.execution_id, &self.step.id, partition)
            .await?;

        let step_properties = properties.resolve_all(&self.step.properties);
        let persistent_user_data = previous
            .filter(|previous| previous.batch_status != BatchStatus::Completed)
            .and_then(|previous| previous.persistent_user_data.clone());

        let context = StepContext {
            step_name: self.step.id.clone(),
            step_execution_id: execution.step_execution_id,
            job_execution_id: self.runtime.execution_id,
            instance_id: self.runtime.instance_id,
            partition,
            batch_status: BatchStatus::Starting,
            exit_status: None,
            properties: step_properties.clone(),
            parameters: self.runtime.parameters.clone(),
            persistent_user_data,
            transient_user_data: None,
            metrics: Default::default(),
            exception: None,
        };

        let transaction = services.transactions.manager_for(&TransactionScope {
            job_execution_id: self.runtime.execution_id,
            step_name: self.step.id.clone(),
            partition,
        });

        Ok(StepScope {
            runtime: self.runtime.clone(),
            step: self.step.clone(),
            execution,
            context,
            properties,
            step_properties,
            listeners: ListenerSet::new(),
            checkpoint_key: CheckpointKey::new(self.runtime.instance_id, self.step.id.as_str(), partition),
            stop,
            transaction,
            sink: None,
            previous_status: previous.map(|previous| previous.batch_status),
        })
    }

    async fn run(&self, mut scope: StepScope, collector: Option<ArtifactRef>) -> Result<StepExecution> {
        let mut machine = StepStateMachine::new(
            StepSubject {
                job_execution_id: self.runtime.execution_id,
                step_execution_id: scope.execution.step_execution_id,
                step_name: self.step.id.clone(),
                partition: scope.execution.partition,
            },
            self.runtime.services.event_publisher.clone(),
        );

        scope.execution.batch_status = BatchStatus::Started;
        scope.execution.start_time = Some(Utc::now());
        scope.context.batch_status = BatchStatus::Started;
        scope.persist().await?;
        machine.transition(&StepEvent::Start)?;

        log_step_operation(
            "start",
            Some(self.runtime.execution_id),
            Some(scope.execution.step_execution_id),
            Some(&self.step.id),
            BatchStatus::Started.as_str(),
            scope.execution.partition.map(|p| format!("partition {p}")).as_deref(),
        );

        let outcome = match self.resolve_artifacts(&mut scope, collector.as_ref()) {
            Ok(()) => self.run_with_listeners(&mut scope).await,
            Err(e) => StepOutcome::Failed(e.to_string()),
        };

        self.finish(machine, scope, outcome).await
    }

    fn resolve_artifacts(&self, scope: &mut StepScope, collector: Option<&ArtifactRef>) -> Result<()> {
        let artifacts = &self.runtime.services.artifacts;

        let mut listeners = ListenerSet::new();
        for listener in &self.step.listeners {
            listeners.push(artifacts.listener(&scope.resolve(listener))?);
        }
        scope.listeners = listeners;

        if let Some(collector) = collector {
            let collector = artifacts.partition_collector(&scope.resolve(collector))?;
            if let Some(sink) = scope.sink.as_mut() {
                sink.set_collector(collector);
            }
        }
        Ok(())
    }

    async fn run_with_listeners(&self, scope: &mut StepScope) -> StepOutcome {
        let listeners = scope.listeners.clone();

        let mut outcome = match listeners.before_step(&mut scope.context).await {
            Ok(()) => match self.run_body(scope).await {
                Ok(outcome) => outcome,
                Err(e) => StepOutcome::Failed(e.to_string()),
            },
            Err(e) => StepOutcome::Failed(format!("before_step listener failed: {e}")),
        };

        if let StepOutcome::Failed(cause) = &outcome {
            scope.context.exception = Some(cause.clone());
        }

        if let Err(e) = listeners.after_step(&mut scope.context).await {
            match outcome {
                StepOutcome::Failed(_) => {
                    warn!(step_name = %self.step.id, error = %e, "after_step listener failed on failed step")
                }
                _ => outcome = StepOutcome::Failed(format!("after_step listener failed: {e}")),
            }
        }

        outcome
    }

    async fn run_body(&self, scope: &mut StepScope) -> Result<StepOutcome> {
        if scope.sink.is_none() {
            if let Some(partition) = &self.step.partition {
                return PartitionCoordinator::new(self, partition).run(scope).await;
            }
        }

        match &self.step.body {
            StepBody::Batchlet(batchlet) => batchlet_step::run(scope, batchlet).await,
            StepBody::Chunk(chunk) => ChunkProcessor::run(scope, chunk).await,
        }
    }

    async fn finish(
        &self,
        mut machine: StepStateMachine,
        mut scope: StepScope,
        mut outcome: StepOutcome,
    ) -> Result<StepExecution> {
        if let Some(sink) = &scope.sink {
            if let Err(e) = sink.collect(&scope.context).await {
                if !matches!(outcome, StepOutcome::Failed(_)) {
                    outcome = StepOutcome::Failed(format!("partition collector failed: {e}"));
                }
            }
        }

        let status = outcome.batch_status();
        scope.execution.batch_status = status;
        scope.context.batch_status = status;
        if let StepOutcome::Failed(cause) = &outcome {
            scope.execution.failure_cause = Some(cause.clone());
        }
        let exit_status = scope.context.exit_status();
        scope.execution.exit_status = Some(exit_status.clone());
        scope.execution.end_time = Some(Utc::now());
        scope.persist().await?;

        if status == BatchStatus::Completed {
            self.runtime
                .services
                .repository
                .remove_checkpoint(&scope.checkpoint_key)
                .await?;
        }

        match &outcome {
            StepOutcome::Completed => {
                machine.transition(&StepEvent::Complete)?;
            }
            StepOutcome::Stopped => {
                machine.transition(&StepEvent::Stop)?;
                machine.transition(&StepEvent::Stopped)?;
            }
            StepOutcome::Failed(cause) => {
                machine.transition(&StepEvent::fail_with_error(cause.clone()))?;
            }
        }

        if let Some(sink) = &scope.sink {
            sink.finished(status, exit_status.clone());
        }

        log_step_operation(
            "finish",
            Some(self.runtime.execution_id),
            Some(scope.execution.step_execution_id),
            Some(&self.step.id),
            status.as_str(),
            scope.execution.failure_cause.as_deref(),
        );

        Ok(scope.execution)
    }
}
