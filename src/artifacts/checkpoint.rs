use super::errors::ArtifactError;
use async_trait::async_trait;

/// Policy deciding when the chunk loop commits
#[async_trait]
pub trait CheckpointAlgorithm: Send + Sync {
    /// Transaction timeout in seconds for the next chunk; `0` keeps the
    /// configured default
    async fn checkpoint_timeout(&mut self) -> Result<u64, ArtifactError> {
        Ok(0)
    }

    async fn begin_checkpoint(&mut self) -> Result<(), ArtifactError> {
        Ok(())
    }

    /// Polled after every processed item
    async fn is_ready_to_checkpoint(&mut self) -> Result<bool, ArtifactError>;

    async fn end_checkpoint(&mut self) -> Result<(), ArtifactError> {
        Ok(())
    }
}
