use super::{
    actions::{PublishTransitionEventAction, StateAction, StepSubject, TraceTransitionAction},
    errors::{StateMachineError, StateMachineResult},
    events::StepEvent,
    states::BatchStatus,
};
use crate::events::EventPublisher;

/// Lifecycle state machine for one step (or partition) execution
pub struct StepStateMachine {
    subject: StepSubject,
    state: BatchStatus,
    actions: Vec<Box<dyn StateAction<StepSubject>>>,
}

impl StepStateMachine {
    pub fn new(subject: StepSubject, event_publisher: EventPublisher) -> Self {
        Self {
            subject,
            state: BatchStatus::Starting,
            actions: vec![
                Box::new(TraceTransitionAction),
                Box::new(PublishTransitionEventAction::new(event_publisher)),
            ],
        }
    }

    pub fn current_state(&self) -> BatchStatus {
        self.state
    }

    /// Attempt to transition the step state
    pub fn transition(&mut self, event: &StepEvent) -> StateMachineResult<BatchStatus> {
        let from = self.state;
        let target = Self::determine_target_state(from, event)?;
        self.state = target;

        for action in &self.actions {
            if let Err(e) = action.execute(&self.subject, from, target, event.event_type()) {
                tracing::warn!(
                    step_name = %self.subject.step_name,
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
        event: &StepEvent,
    ) -> StateMachineResult<BatchStatus> {
        use BatchStatus::*;

        let target = match (current_state, event) {
            (Starting, StepEvent::Start) => Started,

            (Starting | Started, StepEvent::Stop) => Stopping,
            (Starting | Started | Stopping, StepEvent::Stopped) => Stopped,

            // A step may finish its work even though a stop arrived late
            (Started | Stopping, StepEvent::Complete) => Completed,

            (Starting | Started | Stopping, StepEvent::Fail(_)) => Failed,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}
