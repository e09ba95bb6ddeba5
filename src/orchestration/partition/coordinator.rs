use super::PartitionMessage;
use crate::artifacts::{ArtifactError, PartitionAnalyzer, PartitionReducer};
use crate::constants::{error_kinds, events};
use crate::error::{KernelError, Result};
use crate::job::PartitionDefinition;
use crate::models::{PartitionPlan, StepExecution, StepMetrics};
use crate::orchestration::runtime::{StepOutcome, StepScope};
use crate::orchestration::step_controller::{PartitionAssignment, StepController};
use crate::state_machine::BatchStatus;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Runs the partitions of one step and folds their results into the
/// step's own execution
pub struct PartitionCoordinator<'a> {
    controller: &'a StepController,
    definition: &'a PartitionDefinition,
}

/// Aggregate of every partition's final status
#[derive(Debug, Default)]
struct PartitionResults {
    metrics: StepMetrics,
    failure: Option<String>,
    stopped: bool,
}

impl PartitionResults {
    fn record(&mut self, execution: &StepExecution) {
        self.metrics.merge(&execution.metrics);
        match execution.batch_status {
            BatchStatus::Completed => {}
            BatchStatus::Stopped => self.stopped = true,
            _ => self.fail(format!(
                "partition {} ended {}: {}",
                execution.partition.unwrap_or_default(),
                execution.batch_status,
                execution.failure_cause.as_deref().unwrap_or("no cause recorded")
            )),
        }
    }

    fn fail(&mut self, cause: String) {
        if self.failure.is_none() {
            self.failure = Some(cause);
        }
    }

    fn outcome(&self) -> StepOutcome {
        match (&self.failure, self.stopped) {
            (Some(cause), _) => StepOutcome::Failed(cause.clone()),
            (None, true) => StepOutcome::Stopped,
            (None, false) => StepOutcome::Completed,
        }
    }
}

impl<'a> PartitionCoordinator<'a> {
    pub fn new(controller: &'a StepController, definition: &'a PartitionDefinition) -> Self {
        Self {
            controller,
            definition,
        }
    }

    pub async fn run(&self, scope: &mut StepScope) -> Result<StepOutcome> {
        let artifacts = scope.runtime.services.artifacts.clone();
        let reducer = self
            .definition
            .reducer
            .as_ref()
            .map(|reducer| artifacts.partition_reducer(&scope.resolve(reducer)))
            .transpose()?;
        let analyzer = self
            .definition
            .analyzer
            .as_ref()
            .map(|analyzer| artifacts.partition_analyzer(&scope.resolve(analyzer)))
            .transpose()?;

        if let Some(reducer) = &reducer {
            reducer.begin_partitioned_step().await?;
        }

        let mut results = match self.plan(scope).await {
            Ok(plan) => self.execute(scope, plan, analyzer).await?,
            Err(e) => {
                let mut results = PartitionResults::default();
                results.fail(e.to_string());
                results
            }
        };

        if let Some(reducer) = &reducer {
            self.reduce(reducer.as_ref(), &mut results).await;
        }

        scope.execution.metrics.merge(&results.metrics);
        Ok(results.outcome())
    }

    async fn plan(&self, scope: &StepScope) -> Result<PartitionPlan> {
        let plan = match (&self.definition.mapper, &self.definition.plan) {
            (Some(mapper), _) => {
                let mapper = scope
                    .runtime
                    .services
                    .artifacts
                    .partition_mapper(&scope.resolve(mapper))?;
                mapper.map_partitions().await?
            }
            (None, Some(plan)) => plan.clone(),
            (None, None) => {
                return Err(ArtifactError::new(
                    error_kinds::PARTITION_PLAN,
                    "step declares neither a partition plan nor a mapper",
                )
                .into())
            }
        };

        if plan.partitions == 0 {
            return Err(ArtifactError::new(
                error_kinds::PARTITION_PLAN,
                format!("step {} mapped to zero partitions", scope.execution.step_name),
            )
            .into());
        }
        Ok(plan)
    }

    async fn execute(
        &self,
        scope: &mut StepScope,
        plan: PartitionPlan,
        analyzer: Option<Arc<dyn PartitionAnalyzer>>,
    ) -> Result<PartitionResults> {
        let repository = scope.runtime.services.repository.clone();
        let step_name = scope.execution.step_name.clone();
        let instance_id = scope.runtime.instance_id;
        let mut results = PartitionResults::default();

        // Completed partitions of a failed or stopped attempt are not re-run
        let resume = scope
            .previous_status
            .is_some_and(|status| status != BatchStatus::Completed);

        let mut pending = Vec::with_capacity(plan.partitions as usize);
        for partition in 0..plan.partitions {
            if plan.partitions_override {
                repository
                    .remove_checkpoint(&crate::models::CheckpointKey::new(
                        instance_id,
                        step_name.as_str(),
                        Some(partition),
                    ))
                    .await?;
                pending.push((partition, None));
                continue;
            }

            let previous = if resume {
                repository
                    .last_step_execution(instance_id, &step_name, Some(partition))
                    .await?
            } else {
                None
            };
            match previous {
                Some(previous) if previous.batch_status == BatchStatus::Completed => {
                    debug!(step_name = %step_name, partition, "Partition already completed");
                }
                previous => pending.push((partition, previous)),
            }
        }

        let workers = plan.worker_count(scope.runtime.services.config.max_partition_threads);
        info!(
            step_name = %step_name,
            partitions = plan.partitions,
            pending = pending.len(),
            workers,
            "🧩 Running partitions"
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let siblings = scope.stop.child();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        for (partition, previous) in pending {
            let assignment = PartitionAssignment {
                partition,
                properties: plan.properties_for(partition),
                stop: siblings.clone(),
                sender: sender.clone(),
                collector: self.definition.collector.clone(),
                previous,
            };
            let controller = self.controller.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| KernelError::Internal(format!("partition pool closed: {e}")))?;
                controller.execute_partition(assignment).await
            });
        }
        drop(sender);

        while let Some(message) = receiver.recv().await {
            if let Err(e) = self
                .analyze(scope, analyzer.as_deref(), &siblings, message)
                .await
            {
                warn!(step_name = %step_name, error = %e, "Partition analyzer failed");
                results.fail(format!("partition analyzer failed: {e}"));
                siblings.request_stop();
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(execution)) => results.record(&execution),
                Ok(Err(e)) => results.fail(format!("partition could not run: {e}")),
                Err(e) => results.fail(format!("partition task aborted: {e}")),
            }
        }

        Ok(results)
    }

    async fn analyze(
        &self,
        scope: &StepScope,
        analyzer: Option<&dyn PartitionAnalyzer>,
        siblings: &crate::execution::StopToken,
        message: PartitionMessage,
    ) -> std::result::Result<(), ArtifactError> {
        match message {
            PartitionMessage::Collected { data, .. } => {
                if let Some(analyzer) = analyzer {
                    analyzer.analyze_collector_data(data).await?;
                }
            }
            PartitionMessage::Finished {
                partition,
                batch_status,
                exit_status,
            } => {
                let event = if batch_status == BatchStatus::Completed {
                    events::PARTITION_COMPLETED
                } else {
                    // Let the other partitions wind down at their next boundary
                    siblings.request_stop();
                    events::PARTITION_FAILED
                };
                scope.publish(
                    event,
                    json!({
                        "partition": partition,
                        "batch_status": batch_status,
                        "exit_status": exit_status,
                    }),
                );
                if let Some(analyzer) = analyzer {
                    analyzer.analyze_status(batch_status, &exit_status).await?;
                }
            }
        }
        Ok(())
    }

    async fn reduce(&self, reducer: &dyn PartitionReducer, results: &mut PartitionResults) {
        let hook = if results.failure.is_none() && !results.stopped {
            reducer.before_partitioned_step_completion().await
        } else {
            reducer.rollback_partitioned_step().await
        };
        if let Err(e) = hook {
            results.fail(format!("partition reducer failed: {e}"));
        }

        let status = results.outcome().batch_status();
        if let Err(e) = reducer.after_partitioned_step_completion(status).await {
            results.fail(format!("partition reducer failed: {e}"));
        }
    }
}
