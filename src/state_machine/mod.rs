// State machine module for job and step execution lifecycles
//
// Both machines share the BatchStatus vocabulary; transition tables are
// explicit and every accepted transition runs the configured actions
// (tracing + lifecycle event publication).

pub mod actions;
pub mod errors;
pub mod events;
pub mod guards;
pub mod job_state_machine;
pub mod states;
pub mod step_state_machine;

// Re-export main types for convenient access
pub use actions::{JobSubject, StepSubject};
pub use errors::{ActionError, StateMachineError, StateMachineResult};
pub use events::{JobEvent, StepEvent};
pub use job_state_machine::JobStateMachine;
pub use states::BatchStatus;
pub use step_state_machine::StepStateMachine;

// Common traits and utilities
pub use actions::StateAction;
pub use guards::{AbandonGuard, RestartGuard, StateGuard, StopGuard};
