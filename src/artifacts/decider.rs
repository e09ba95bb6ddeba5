use super::errors::ArtifactError;
use crate::models::StepExecution;
use async_trait::async_trait;

/// Chooses the exit status of a decision element
///
/// Receives the executions of the element that ran immediately before the
/// decision: one step, or the last step of every flow of a split.
#[async_trait]
pub trait Decider: Send + Sync {
    async fn decide(&self, executions: &[StepExecution]) -> Result<String, ArtifactError>;
}
