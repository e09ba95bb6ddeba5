//! # Transition Navigator
//!
//! Decides where control goes after an element finishes, from the element's
//! batch status, its exit status and its declared transitions.

use crate::job::{ExecutionElement, Transition};
use crate::state_machine::BatchStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Continue with the sibling element of that id
    Goto(String),
    /// `end` transition: finish the job COMPLETED
    End(Option<String>),
    /// `fail` transition: finish the job FAILED
    Fail(Option<String>),
    /// `stop` transition: finish the job STOPPED, optionally recording where
    /// a restart should begin
    Stop {
        exit_status: Option<String>,
        restart: Option<String>,
    },
    /// No transition and no `next`: the sequence is done
    Finish,
    /// The element failed and nothing handled it
    Failed,
    /// The element was stopped
    Stopped,
}

/// Resolve the next move for a finished element
///
/// A stopped element always stops the job. Otherwise transitions are
/// evaluated in declared order against the exit status; a failed element
/// with no matching transition fails the job; finally the `next` attribute
/// applies.
pub fn navigate(element: &ExecutionElement, batch_status: BatchStatus, exit_status: &str) -> Navigation {
    if batch_status == BatchStatus::Stopped {
        return Navigation::Stopped;
    }

    if let Some(transition) = element
        .transitions()
        .iter()
        .find(|transition| transition.matches(exit_status))
    {
        return match transition {
            Transition::Next { to, .. } => Navigation::Goto(to.clone()),
            Transition::End { exit_status, .. } => Navigation::End(exit_status.clone()),
            Transition::Fail { exit_status, .. } => Navigation::Fail(exit_status.clone()),
            Transition::Stop {
                exit_status,
                restart,
                ..
            } => Navigation::Stop {
                exit_status: exit_status.clone(),
                restart: restart.clone(),
            },
        };
    }

    if batch_status == BatchStatus::Failed {
        return Navigation::Failed;
    }

    match element.next() {
        Some(next) => Navigation::Goto(next.to_string()),
        None => Navigation::Finish,
    }
}
