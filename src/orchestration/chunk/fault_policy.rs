use crate::artifacts::{ArtifactError, ExceptionClassFilter, ItemPhase};
use crate::job::ChunkDefinition;

/// What the chunk loop does about one artifact failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultDecision {
    /// Try the operation again; `rollback` re-reads the chunk in isolation
    Retry { rollback: bool },
    /// Absorb the failure; `rollback` discards the whole chunk first
    Skip { rollback: bool },
    /// Roll back and fail the step
    Fail,
}

/// Skip/retry evaluator for one step execution
///
/// Retry is considered before skip. Both limits are inclusive and count only
/// within the current step execution; `None` means unlimited. Once the retry
/// limit is used up, a retryable failure fails the step even if it is also
/// skippable.
#[derive(Debug, Clone)]
pub struct FaultPolicy {
    skippable: ExceptionClassFilter,
    retryable: ExceptionClassFilter,
    no_rollback: ExceptionClassFilter,
    skip_limit: Option<u32>,
    retry_limit: Option<u32>,
    retries: u32,
}

impl FaultPolicy {
    pub fn from_chunk(chunk: &ChunkDefinition) -> Self {
        Self {
            skippable: chunk.skippable.clone(),
            retryable: chunk.retryable.clone(),
            no_rollback: chunk.no_rollback.clone(),
            skip_limit: chunk.skip_limit,
            retry_limit: chunk.retry_limit,
            retries: 0,
        }
    }

    /// Classify a failure given the number of skips already absorbed
    pub fn classify(&mut self, phase: ItemPhase, error: &ArtifactError, skips: u64) -> FaultDecision {
        let rollback = !self.no_rollback.matches(error);

        if self.retryable.matches(error) {
            if !within(self.retry_limit, u64::from(self.retries)) {
                return FaultDecision::Fail;
            }
            self.retries += 1;
            return FaultDecision::Retry { rollback };
        }

        if self.skippable.matches(error) && within(self.skip_limit, skips) {
            return FaultDecision::Skip {
                rollback: phase == ItemPhase::Write && rollback,
            };
        }

        FaultDecision::Fail
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }
}

fn within(limit: Option<u32>, used: u64) -> bool {
    limit.map_or(true, |limit| used < u64::from(limit))
}
