//! # Completion Registry
//!
//! Per-execution completion gates. A gate is registered when an execution is
//! launched and released exactly once, when it reaches a terminal status;
//! the entry is removed at release so completed executions never leak.
//!
//! Waiters always check the repository first, so a waiter arriving after
//! completion (or for an execution launched elsewhere) never blocks on a gate
//! that will not fire.

use crate::error::{KernelError, Result};
use crate::models::JobExecution;
use crate::persistence::JobRepository;
use crate::state_machine::BatchStatus;
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Default)]
pub struct CompletionRegistry {
    gates: DashMap<i64, watch::Sender<Option<BatchStatus>>>,
}

impl CompletionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, execution_id: i64) {
        self.gates
            .entry(execution_id)
            .or_insert_with(|| watch::channel(None).0);
    }

    /// Release every waiter of the execution and drop its gate
    pub fn complete(&self, execution_id: i64, status: BatchStatus) {
        if let Some((_, gate)) = self.gates.remove(&execution_id) {
            gate.send_replace(Some(status));
            debug!(
                execution_id = execution_id,
                status = %status,
                "🏁 COMPLETION: Released waiters"
            );
        }
    }

    pub fn is_registered(&self, execution_id: i64) -> bool {
        self.gates.contains_key(&execution_id)
    }

    pub fn pending(&self) -> usize {
        self.gates.len()
    }

    /// Block until the execution is terminal in the repository
    pub async fn wait(
        &self,
        execution_id: i64,
        repository: &dyn JobRepository,
        poll_interval: Duration,
    ) -> Result<JobExecution> {
        loop {
            // Subscribe before reading so a release in between is not missed
            let receiver = self.gates.get(&execution_id).map(|gate| gate.subscribe());

            let execution = repository
                .job_execution(execution_id)
                .await?
                .ok_or(KernelError::NoSuchJobExecution { execution_id })?;

            if execution.batch_status.is_terminal() {
                return Ok(execution);
            }

            match receiver {
                Some(mut receiver) => {
                    // Bounded so a status written without a release is still seen
                    let _ = tokio::time::timeout(
                        poll_interval,
                        receiver.wait_for(|status| status.is_some()),
                    )
                    .await;
                }
                None => tokio::time::sleep(poll_interval).await,
            }
        }
    }
}
