use super::context::StepContext;
use super::errors::ArtifactError;
use async_trait::async_trait;

/// Single unit of work run by a batchlet step
///
/// `stop` may be called concurrently with a running `process`; the batchlet
/// is expected to return from `process` soon after.
#[async_trait]
pub trait Batchlet: Send + Sync {
    /// Do the work; the returned string, if any, becomes the exit status
    async fn process(&self, context: &mut StepContext) -> Result<Option<String>, ArtifactError>;

    async fn stop(&self) -> Result<(), ArtifactError> {
        Ok(())
    }
}
