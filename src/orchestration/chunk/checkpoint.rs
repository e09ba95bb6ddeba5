use crate::artifacts::{ArtifactError, CheckpointAlgorithm};
use crate::job::{ChunkDefinition, CheckpointPolicy};
use crate::orchestration::runtime::StepScope;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Built-in item-count policy: a chunk is ready after `item_count` items or,
/// when a time limit is set, once that many seconds have passed since the
/// chunk began, whichever comes first
#[derive(Debug)]
pub struct ItemCountCheckpointAlgorithm {
    item_count: u32,
    time_limit: Option<Duration>,
    count: u32,
    started: Instant,
}

impl ItemCountCheckpointAlgorithm {
    pub fn new(item_count: u32, time_limit_seconds: Option<u64>) -> Self {
        Self {
            item_count: item_count.max(1),
            time_limit: time_limit_seconds
                .filter(|seconds| *seconds > 0)
                .map(Duration::from_secs),
            count: 0,
            started: Instant::now(),
        }
    }
}

#[async_trait]
impl CheckpointAlgorithm for ItemCountCheckpointAlgorithm {
    async fn begin_checkpoint(&mut self) -> Result<(), ArtifactError> {
        self.count = 0;
        self.started = Instant::now();
        Ok(())
    }

    async fn is_ready_to_checkpoint(&mut self) -> Result<bool, ArtifactError> {
        self.count += 1;
        let expired = self
            .time_limit
            .is_some_and(|limit| self.started.elapsed() >= limit);
        Ok(self.count >= self.item_count || expired)
    }
}

/// Pick the checkpoint algorithm a chunk step is configured with
pub fn checkpoint_algorithm_for(
    chunk: &ChunkDefinition,
    scope: &StepScope,
) -> Result<Box<dyn CheckpointAlgorithm>, ArtifactError> {
    match (chunk.checkpoint_policy, &chunk.checkpoint_algorithm) {
        (CheckpointPolicy::Custom, Some(algorithm)) => scope
            .runtime
            .services
            .artifacts
            .checkpoint_algorithm(&scope.resolve(algorithm)),
        (CheckpointPolicy::Custom, None) => Err(ArtifactError::new(
            crate::constants::error_kinds::ARTIFACT_NOT_FOUND,
            format!(
                "step {} uses a custom checkpoint policy without an algorithm",
                scope.execution.step_name
            ),
        )),
        (CheckpointPolicy::Item, _) => {
            let item_count = chunk
                .item_count
                .unwrap_or(scope.runtime.services.config.default_item_count);
            Ok(Box::new(ItemCountCheckpointAlgorithm::new(
                item_count,
                chunk.time_limit,
            )))
        }
    }
}
