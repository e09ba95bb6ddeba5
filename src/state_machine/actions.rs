use super::errors::{ActionError, ActionResult};
use super::states::BatchStatus;
use crate::constants::events;
use crate::events::{EventPublisher, LifecycleEvent};
use serde_json::json;

/// Identity of the job execution a transition applies to
#[derive(Debug, Clone)]
pub struct JobSubject {
    pub execution_id: i64,
    pub job_name: String,
}

/// Identity of the step execution a transition applies to
#[derive(Debug, Clone)]
pub struct StepSubject {
    pub job_execution_id: i64,
    pub step_execution_id: i64,
    pub step_name: String,
    pub partition: Option<u32>,
}

/// Trait for implementing state transition actions
pub trait StateAction<T>: Send + Sync {
    /// Execute the action after a transition was accepted
    fn execute(
        &self,
        subject: &T,
        from_state: BatchStatus,
        to_state: BatchStatus,
        event: &str,
    ) -> ActionResult<()>;

    /// Get a description of this action for logging
    fn description(&self) -> &'static str;
}

/// Action to publish lifecycle events when state transitions occur
pub struct PublishTransitionEventAction {
    event_publisher: EventPublisher,
}

impl PublishTransitionEventAction {
    pub fn new(event_publisher: EventPublisher) -> Self {
        Self { event_publisher }
    }
}

impl StateAction<JobSubject> for PublishTransitionEventAction {
    fn execute(
        &self,
        subject: &JobSubject,
        from_state: BatchStatus,
        to_state: BatchStatus,
        event: &str,
    ) -> ActionResult<()> {
        let Some(event_name) = determine_job_event_name(to_state) else {
            return Ok(());
        };

        let lifecycle_event = LifecycleEvent::for_job(
            event_name,
            subject.execution_id,
            json!({
                "job_name": subject.job_name,
                "from_state": from_state,
                "to_state": to_state,
                "event": event,
            }),
        );

        self.event_publisher
            .publish(lifecycle_event)
            .map_err(|_| ActionError::EventPublishFailed {
                event_name: event_name.to_string(),
            })
    }

    fn description(&self) -> &'static str {
        "Publish lifecycle event for job transition"
    }
}

impl StateAction<StepSubject> for PublishTransitionEventAction {
    fn execute(
        &self,
        subject: &StepSubject,
        from_state: BatchStatus,
        to_state: BatchStatus,
        event: &str,
    ) -> ActionResult<()> {
        let Some(event_name) = determine_step_event_name(to_state) else {
            return Ok(());
        };

        let lifecycle_event = LifecycleEvent::for_step(
            event_name,
            subject.job_execution_id,
            &subject.step_name,
            subject.partition,
            json!({
                "step_execution_id": subject.step_execution_id,
                "from_state": from_state,
                "to_state": to_state,
                "event": event,
            }),
        );

        self.event_publisher
            .publish(lifecycle_event)
            .map_err(|_| ActionError::EventPublishFailed {
                event_name: event_name.to_string(),
            })
    }

    fn description(&self) -> &'static str {
        "Publish lifecycle event for step transition"
    }
}

/// Action that traces every accepted transition
pub struct TraceTransitionAction;

impl StateAction<JobSubject> for TraceTransitionAction {
    fn execute(
        &self,
        subject: &JobSubject,
        from_state: BatchStatus,
        to_state: BatchStatus,
        event: &str,
    ) -> ActionResult<()> {
        tracing::debug!(
            execution_id = subject.execution_id,
            job_name = %subject.job_name,
            from = %from_state,
            to = %to_state,
            event = event,
            "🔄 JOB_TRANSITION"
        );
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Trace job transition"
    }
}

impl StateAction<StepSubject> for TraceTransitionAction {
    fn execute(
        &self,
        subject: &StepSubject,
        from_state: BatchStatus,
        to_state: BatchStatus,
        event: &str,
    ) -> ActionResult<()> {
        tracing::debug!(
            job_execution_id = subject.job_execution_id,
            step_execution_id = subject.step_execution_id,
            step_name = %subject.step_name,
            partition = subject.partition,
            from = %from_state,
            to = %to_state,
            event = event,
            "🔄 STEP_TRANSITION"
        );
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Trace step transition"
    }
}

fn determine_job_event_name(to_state: BatchStatus) -> Option<&'static str> {
    match to_state {
        BatchStatus::Starting => None,
        BatchStatus::Started => Some(events::JOB_STARTED),
        BatchStatus::Stopping => Some(events::JOB_STOPPING),
        BatchStatus::Stopped => Some(events::JOB_STOPPED),
        BatchStatus::Completed => Some(events::JOB_COMPLETED),
        BatchStatus::Failed => Some(events::JOB_FAILED),
        BatchStatus::Abandoned => Some(events::JOB_ABANDONED),
    }
}

fn determine_step_event_name(to_state: BatchStatus) -> Option<&'static str> {
    match to_state {
        BatchStatus::Started => Some(events::STEP_STARTED),
        BatchStatus::Stopping => Some(events::STEP_STOPPING),
        BatchStatus::Stopped => Some(events::STEP_STOPPED),
        BatchStatus::Completed => Some(events::STEP_COMPLETED),
        BatchStatus::Failed => Some(events::STEP_FAILED),
        BatchStatus::Starting | BatchStatus::Abandoned => None,
    }
}
