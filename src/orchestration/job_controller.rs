//! # Job Controller
//!
//! Executes the elements of one job execution in order: steps, decisions,
//! flows and splits, following transitions and recording the final status.
//! Restarted executions skip steps that already completed in an earlier
//! attempt and resume at the recorded restart position.

use crate::artifacts::{JobContext, ListenerSet};
use crate::constants::events;
use crate::error::{KernelError, Result};
use crate::job::{ExecutionElement, SplitDefinition, StepDefinition};
use crate::logging::log_job_operation;
use crate::models::StepExecution;
use crate::orchestration::navigator::{navigate, Navigation};
use crate::orchestration::runtime::JobRuntime;
use crate::orchestration::step_controller::StepController;
use crate::state_machine::{BatchStatus, JobEvent, JobStateMachine, JobSubject};
use chrono::Utc;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a sequence of elements (the job, a flow or a split) ended
#[derive(Debug, Clone)]
pub enum SequenceOutcome {
    /// Ran off the end; carries the step executions of the last element
    Completed { last: Vec<StepExecution> },
    Ended { exit_status: Option<String> },
    Failed {
        exit_status: Option<String>,
        cause: String,
    },
    Stopped {
        exit_status: Option<String>,
        restart: Option<String>,
    },
}

impl SequenceOutcome {
    fn precedence(&self) -> u8 {
        match self {
            Self::Failed { .. } => 3,
            Self::Stopped { .. } => 2,
            Self::Ended { .. } => 1,
            Self::Completed { .. } => 0,
        }
    }
}

enum StepRun {
    Executed(StepExecution),
    AlreadyCompleted(StepExecution),
    StartLimitExceeded(u32),
}

pub struct JobController {
    runtime: Arc<JobRuntime>,
}

impl JobController {
    pub fn new(runtime: Arc<JobRuntime>) -> Self {
        Self { runtime }
    }

    /// Run the execution to a terminal status
    pub async fn run(self) -> Result<BatchStatus> {
        let runtime = self.runtime.clone();
        let services = &runtime.services;
        let mut machine = JobStateMachine::new(
            JobSubject {
                execution_id: runtime.execution_id,
                job_name: runtime.job_name().to_string(),
            },
            BatchStatus::Starting,
            services.event_publisher.clone(),
        );

        let claimed = services
            .repository
            .update_job_status(runtime.execution_id, &[BatchStatus::Starting], BatchStatus::Started)
            .await?;
        if claimed.is_none() {
            return self.stopped_before_start(machine).await;
        }
        machine.transition(&JobEvent::Start)?;

        log_job_operation(
            "start",
            Some(runtime.execution_id),
            Some(runtime.job_name()),
            BatchStatus::Started.as_str(),
            runtime.restart_of.map(|id| format!("restart of {id}")).as_deref(),
        );

        let mut context = JobContext {
            job_name: runtime.job_name().to_string(),
            instance_id: runtime.instance_id,
            execution_id: runtime.execution_id,
            batch_status: BatchStatus::Started,
            exit_status: None,
            properties: runtime.properties.job_properties().clone(),
            parameters: runtime.parameters.clone(),
            transient_user_data: None,
        };

        let listeners = self.resolve_listeners();
        let outcome = match &listeners {
            Ok(listeners) => match listeners.before_job(&mut context).await {
                Ok(()) => self.execute_job().await,
                Err(e) => Err(KernelError::Artifact(e)),
            },
            Err(e) => Err(KernelError::Internal(e.to_string())),
        };

        let outcome = outcome.unwrap_or_else(|e| SequenceOutcome::Failed {
            exit_status: None,
            cause: e.to_string(),
        });

        self.finish(machine, context, listeners.ok(), outcome).await
    }

    fn resolve_listeners(&self) -> Result<ListenerSet> {
        let job = &self.runtime.job;
        let mut listeners = ListenerSet::new();
        for listener in &job.listeners {
            let artifact = self
                .runtime
                .properties
                .resolve_ref(listener, self.runtime.properties.job_properties());
            listeners.push(self.runtime.services.artifacts.listener(&artifact)?);
        }
        Ok(listeners)
    }

    async fn execute_job(&self) -> Result<SequenceOutcome> {
        let job = self.runtime.job.clone();
        let start_at = self
            .runtime
            .restart_position
            .as_deref()
            .and_then(|position| job.position_of(position))
            .unwrap_or(0);

        if start_at > 0 {
            debug!(
                execution_id = self.runtime.execution_id,
                restart_position = ?self.runtime.restart_position,
                "Resuming at recorded restart position"
            );
        }

        self.execute_sequence(&job.elements, start_at, Vec::new()).await
    }

    /// Execute `elements` from `start`, following transitions among them
    fn execute_sequence<'a>(
        &'a self,
        elements: &'a [ExecutionElement],
        start: usize,
        last: Vec<StepExecution>,
    ) -> BoxFuture<'a, Result<SequenceOutcome>> {
        async move {
            let mut index = start;
            let mut last = last;

            while let Some(element) = elements.get(index) {
                if self.runtime.stop.is_stop_requested() {
                    return Ok(SequenceOutcome::Stopped {
                        exit_status: None,
                        restart: None,
                    });
                }

                let (batch_status, exit_status) = match element {
                    ExecutionElement::Step(step) => match self.run_step(step).await? {
                        StepRun::Executed(execution) | StepRun::AlreadyCompleted(execution) => {
                            let result = (execution.batch_status, execution.effective_exit_status());
                            last = vec![execution];
                            result
                        }
                        StepRun::StartLimitExceeded(starts) => {
                            return Ok(SequenceOutcome::Failed {
                                exit_status: None,
                                cause: format!(
                                    "step {} reached its start limit of {} ({} starts)",
                                    step.id, step.start_limit, starts
                                ),
                            })
                        }
                    },
                    ExecutionElement::Decision(decision) => {
                        let artifact = self
                            .runtime
                            .properties
                            .resolve_ref(&decision.decider, self.runtime.properties.job_properties());
                        let decider = self.runtime.services.artifacts.decider(&artifact)?;
                        let exit_status = decider.decide(&last).await?;
                        debug!(decision = %decision.id, exit_status = %exit_status, "Decider returned");
                        (BatchStatus::Completed, exit_status)
                    }
                    ExecutionElement::Flow(flow) => {
                        match self.execute_sequence(&flow.elements, 0, last.clone()).await? {
                            SequenceOutcome::Completed { last: flow_last } => {
                                last = flow_last;
                                (BatchStatus::Completed, BatchStatus::Completed.as_str().to_string())
                            }
                            other => return Ok(other),
                        }
                    }
                    ExecutionElement::Split(split) => match self.execute_split(split, &last).await? {
                        SequenceOutcome::Completed { last: split_last } => {
                            last = split_last;
                            (BatchStatus::Completed, BatchStatus::Completed.as_str().to_string())
                        }
                        other => return Ok(other),
                    },
                };

                match navigate(element, batch_status, &exit_status) {
                    Navigation::Goto(target) => {
                        index = elements
                            .iter()
                            .position(|candidate| candidate.id() == target)
                            .ok_or_else(|| {
                                KernelError::Configuration(format!(
                                    "transition from {} targets unknown element {target}",
                                    element.id()
                                ))
                            })?;
                    }
                    Navigation::Finish => return Ok(SequenceOutcome::Completed { last }),
                    Navigation::End(exit_status) => {
                        return Ok(SequenceOutcome::Ended { exit_status })
                    }
                    Navigation::Fail(fail_status) => {
                        let cause = format!(
                            "fail transition of {} matched exit status {exit_status}",
                            element.id()
                        );
                        return Ok(SequenceOutcome::Failed {
                            exit_status: fail_status,
                            cause,
                        });
                    }
                    Navigation::Stop {
                        exit_status,
                        restart,
                    } => return Ok(SequenceOutcome::Stopped { exit_status, restart }),
                    Navigation::Failed => {
                        return Ok(SequenceOutcome::Failed {
                            exit_status: None,
                            cause: format!("{} failed with exit status {exit_status}", element.id()),
                        })
                    }
                    Navigation::Stopped => {
                        return Ok(SequenceOutcome::Stopped {
                            exit_status: None,
                            restart: None,
                        })
                    }
                }
            }

            Ok(SequenceOutcome::Completed { last })
        }
        .boxed()
    }

    async fn execute_split(
        &self,
        split: &SplitDefinition,
        last: &[StepExecution],
    ) -> Result<SequenceOutcome> {
        let flows = split
            .flows
            .iter()
            .map(|flow| self.execute_sequence(&flow.elements, 0, last.to_vec()));

        let mut combined: Vec<StepExecution> = Vec::new();
        let mut worst: Option<SequenceOutcome> = None;
        for result in join_all(flows).await {
            let outcome = result?;
            if let SequenceOutcome::Completed { last } = &outcome {
                combined.extend(last.iter().cloned());
            }
            if worst
                .as_ref()
                .map_or(true, |current| outcome.precedence() > current.precedence())
            {
                worst = Some(outcome);
            }
        }

        Ok(match worst {
            Some(SequenceOutcome::Completed { .. }) | None => {
                SequenceOutcome::Completed { last: combined }
            }
            Some(other) => other,
        })
    }

    async fn run_step(&self, step: &StepDefinition) -> Result<StepRun> {
        let repository = &self.runtime.services.repository;
        let previous = repository
            .last_step_execution(self.runtime.instance_id, &step.id, None)
            .await?;

        if let Some(previous) = &previous {
            let earlier_attempt = previous.job_execution_id != self.runtime.execution_id;
            if earlier_attempt
                && previous.batch_status == BatchStatus::Completed
                && !step.allow_start_if_complete
            {
                info!(
                    execution_id = self.runtime.execution_id,
                    step_name = %step.id,
                    "⏭️ Step already completed, not re-running"
                );
                self.runtime.publish(
                    events::STEP_SKIPPED_COMPLETE,
                    json!({
                        "step_name": step.id,
                        "step_execution_id": previous.step_execution_id,
                        "exit_status": previous.effective_exit_status(),
                    }),
                );
                return Ok(StepRun::AlreadyCompleted(previous.clone()));
            }
        }

        if step.start_limit > 0 {
            let starts = repository
                .step_start_count(self.runtime.instance_id, &step.id)
                .await?;
            if starts >= step.start_limit {
                return Ok(StepRun::StartLimitExceeded(starts));
            }
        }

        let controller = StepController::new(self.runtime.clone(), Arc::new(step.clone()));
        Ok(StepRun::Executed(controller.execute(previous.as_ref()).await?))
    }

    async fn finish(
        &self,
        mut machine: JobStateMachine,
        mut context: JobContext,
        listeners: Option<ListenerSet>,
        outcome: SequenceOutcome,
    ) -> Result<BatchStatus> {
        let (mut status, exit_status, restart_position, mut cause) = match outcome {
            SequenceOutcome::Completed { .. } => (BatchStatus::Completed, None, None, None),
            SequenceOutcome::Ended { exit_status } => (BatchStatus::Completed, exit_status, None, None),
            SequenceOutcome::Failed { exit_status, cause } => {
                (BatchStatus::Failed, exit_status, None, Some(cause))
            }
            SequenceOutcome::Stopped {
                exit_status,
                restart,
            } => (BatchStatus::Stopped, exit_status, restart, None),
        };

        if let Some(exit_status) = exit_status {
            context.set_exit_status(exit_status);
        }

        context.batch_status = status;
        if let Some(listeners) = &listeners {
            if let Err(e) = listeners.after_job(&mut context).await {
                warn!(execution_id = self.runtime.execution_id, error = %e, "after_job listener failed");
                if status != BatchStatus::Failed {
                    status = BatchStatus::Failed;
                    cause = Some(format!("after_job listener failed: {e}"));
                }
            }
        }

        context.batch_status = status;
        let repository = &self.runtime.services.repository;
        let mut execution = repository
            .job_execution(self.runtime.execution_id)
            .await?
            .ok_or(KernelError::NoSuchJobExecution {
                execution_id: self.runtime.execution_id,
            })?;

        let now = Utc::now();
        execution.batch_status = status;
        execution.exit_status = Some(context.exit_status());
        execution.end_time = Some(now);
        execution.last_updated = now;
        execution.restart_position = restart_position;
        repository.update_job_execution(&execution).await?;

        match status {
            BatchStatus::Completed => {
                machine.transition(&JobEvent::Complete)?;
            }
            BatchStatus::Stopped => {
                machine.transition(&JobEvent::Stop)?;
                machine.transition(&JobEvent::Stopped)?;
            }
            _ => {
                machine.transition(&JobEvent::fail_with_error(
                    cause.clone().unwrap_or_default(),
                ))?;
            }
        }

        log_job_operation(
            "finish",
            Some(self.runtime.execution_id),
            Some(self.runtime.job_name()),
            status.as_str(),
            cause.as_deref(),
        );
        Ok(status)
    }

    /// A stop reached the execution before it was picked up
    async fn stopped_before_start(&self, mut machine: JobStateMachine) -> Result<BatchStatus> {
        let repository = &self.runtime.services.repository;
        let execution_id = self.runtime.execution_id;

        let stopped = repository
            .update_job_status(execution_id, &[BatchStatus::Stopping], BatchStatus::Stopped)
            .await?;
        let Some(mut execution) = stopped else {
            return Err(KernelError::Internal(format!(
                "job execution {execution_id} was claimed by another controller"
            )));
        };

        execution.exit_status = Some(BatchStatus::Stopped.as_str().to_string());
        repository.update_job_execution(&execution).await?;
        machine.transition(&JobEvent::Stopped)?;

        log_job_operation(
            "finish",
            Some(execution_id),
            Some(self.runtime.job_name()),
            BatchStatus::Stopped.as_str(),
            Some("stopped before start"),
        );
        Ok(BatchStatus::Stopped)
    }
}
