use crate::error::Result;
use crate::job::ArtifactRef;
use crate::orchestration::runtime::{StepOutcome, StepScope};
use tracing::{debug, warn};

/// Run a batchlet step body
///
/// The batchlet's `stop` is invoked at most once, when a stop is requested
/// while `process` is still running. A batchlet that returns after being
/// asked to stop ends STOPPED.
pub async fn run(scope: &mut StepScope, batchlet_ref: &ArtifactRef) -> Result<StepOutcome> {
    let batchlet = scope
        .runtime
        .services
        .artifacts
        .batchlet(&scope.resolve(batchlet_ref))?;

    if scope.stop.is_stop_requested() {
        return Ok(StepOutcome::Stopped);
    }

    let stop = scope.stop.clone();
    let step_name = scope.execution.step_name.clone();
    let mut stop_sent = false;

    let result = {
        let process = batchlet.process(&mut scope.context);
        tokio::pin!(process);

        loop {
            tokio::select! {
                result = &mut process => break result,
                _ = stop.stopped(), if !stop_sent => {
                    stop_sent = true;
                    debug!(step_name = %step_name, "🛑 Forwarding stop to batchlet");
                    if let Err(e) = batchlet.stop().await {
                        warn!(step_name = %step_name, error = %e, "Batchlet stop failed");
                    }
                }
            }
        }
    };

    match result {
        Ok(exit_status) => {
            if let Some(exit_status) = exit_status {
                scope.context.set_exit_status(exit_status);
            }
            if stop_sent || scope.stop.is_stop_requested() {
                Ok(StepOutcome::Stopped)
            } else {
                Ok(StepOutcome::Completed)
            }
        }
        Err(e) => Ok(StepOutcome::Failed(e.to_string())),
    }
}
