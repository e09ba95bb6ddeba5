use super::{
    actions::{JobSubject, PublishTransitionEventAction, StateAction, TraceTransitionAction},
    errors::{StateMachineError, StateMachineResult},
    events::JobEvent,
    states::BatchStatus,
};
use crate::events::EventPublisher;

/// Lifecycle state machine for one job execution
///
/// Holds the in-memory status of the execution; callers persist the
/// resulting status through the repository after each accepted transition.
pub struct JobStateMachine {
    subject: JobSubject,
    state: BatchStatus,
    actions: Vec<Box<dyn StateAction<JobSubject>>>,
}

impl JobStateMachine {
    /// Create a new job state machine instance positioned at `current`
    pub fn new(subject: JobSubject, current: BatchStatus, event_publisher: EventPublisher) -> Self {
        Self {
            subject,
            state: current,
            actions: vec![
                Box::new(TraceTransitionAction),
                Box::new(PublishTransitionEventAction::new(event_publisher)),
            ],
        }
    }

    /// Create a machine without side-effecting actions
    pub fn detached(subject: JobSubject, current: BatchStatus) -> Self {
        Self {
            subject,
            state: current,
            actions: Vec::new(),
        }
    }

    /// Get the current state of the execution
    pub fn current_state(&self) -> BatchStatus {
        self.state
    }

    /// Attempt to transition the execution state
    pub fn transition(&mut self, event: &JobEvent) -> StateMachineResult<BatchStatus> {
        let from = self.state;
        let target = Self::determine_target_state(from, event)?;
        self.state = target;

        for action in &self.actions {
            if let Err(e) = action.execute(&self.subject, from, target, event.event_type()) {
                tracing::warn!(
                    execution_id = self.subject.execution_id,
                    action = action.description(),
                    error = %e,
                    "Transition action failed"
                );
            }
        }

        Ok(target)
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: BatchStatus,
        event: &JobEvent,
    ) -> StateMachineResult<BatchStatus> {
        use BatchStatus::*;

        let target = match (current_state, event) {
            (Starting, JobEvent::Start) => Started,

            (Starting | Started, JobEvent::Stop) => Stopping,
            (Starting | Started | Stopping, JobEvent::Stopped) => Stopped,

            (Started | Stopping, JobEvent::Complete) => Completed,

            (Starting | Started | Stopping, JobEvent::Fail(_)) => Failed,

            (Completed | Failed | Stopped | Abandoned, JobEvent::Abandon) => Abandoned,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Check if the execution is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn execution_id(&self) -> i64 {
        self.subject.execution_id
    }
}
