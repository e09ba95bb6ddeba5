use super::checkpoint::checkpoint_algorithm_for;
use super::fault_policy::{FaultDecision, FaultPolicy};
use crate::artifacts::{
    ArtifactError, CheckpointAlgorithm, ItemPhase, ItemProcessor, ItemReader, ItemWriter,
};
use crate::constants::events;
use crate::error::Result;
use crate::job::ChunkDefinition;
use crate::models::{Checkpoint, MetricType, StepMetrics};
use crate::orchestration::runtime::{StepOutcome, StepScope};
use crate::transaction::TransactionStatus;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Items and metrics of the chunk in flight; discarded on rollback
#[derive(Debug, Default)]
struct ChunkState {
    buffer: Vec<Value>,
    /// Reader positions consumed by this chunk
    positions: u64,
    metrics: StepMetrics,
    end_of_data: bool,
}

#[derive(Debug)]
enum ChunkFlow {
    Commit,
    RolledBack,
    Failed(ArtifactError),
}

#[derive(Debug)]
enum ErrorFlow {
    RetryInPlace,
    Skipped,
    Abort(ChunkFlow),
}

/// Read-process-write loop of one chunk step (or chunk partition)
pub struct ChunkProcessor<'a> {
    scope: &'a mut StepScope,
    reader: Box<dyn ItemReader>,
    processor: Option<Box<dyn ItemProcessor>>,
    writer: Box<dyn ItemWriter>,
    algorithm: Box<dyn CheckpointAlgorithm>,
    policy: FaultPolicy,
    last_checkpoint: Checkpoint,
    /// Items still to re-read one per chunk after a rollback
    replay_remaining: u64,
}

impl<'a> ChunkProcessor<'a> {
    pub async fn run(scope: &'a mut StepScope, chunk: &ChunkDefinition) -> Result<StepOutcome> {
        let artifacts = scope.runtime.services.artifacts.clone();
        let reader = artifacts.item_reader(&scope.resolve(&chunk.reader))?;
        let processor = chunk
            .processor
            .as_ref()
            .map(|processor| artifacts.item_processor(&scope.resolve(processor)))
            .transpose()?;
        let writer = artifacts.item_writer(&scope.resolve(&chunk.writer))?;
        let algorithm = checkpoint_algorithm_for(chunk, scope)?;

        let last_checkpoint = scope
            .runtime
            .services
            .repository
            .load_checkpoint(&scope.checkpoint_key)
            .await?
            .unwrap_or_default();

        let mut runner = Self {
            scope,
            reader,
            processor,
            writer,
            algorithm,
            policy: FaultPolicy::from_chunk(chunk),
            last_checkpoint,
            replay_remaining: 0,
        };

        if let Err(e) = runner.open().await {
            runner.close_quietly().await;
            return Err(e);
        }

        let outcome = match runner.process_chunks().await {
            Ok(outcome) => outcome,
            Err(e) => {
                let rollback = runner.roll_back_if_active().await;
                runner.close_quietly().await;
                return match rollback {
                    Some(rollback) => Ok(StepOutcome::Failed(format!("{e}; {rollback}"))),
                    None => Err(e),
                };
            }
        };

        match runner.close().await {
            Ok(()) => Ok(outcome),
            Err(e) if outcome == StepOutcome::Completed => Ok(StepOutcome::Failed(format!(
                "closing chunk artifacts failed: {e}"
            ))),
            Err(e) => {
                warn!(step_name = %runner.scope.execution.step_name, error = %e, "Close failed after step ended");
                Ok(outcome)
            }
        }
    }

    async fn process_chunks(&mut self) -> Result<StepOutcome> {
        loop {
            if self.scope.stop.is_stop_requested() {
                debug!(step_name = %self.scope.execution.step_name, "🛑 Stop observed at chunk boundary");
                return Ok(StepOutcome::Stopped);
            }

            let isolating = self.replay_remaining > 0;
            self.begin_chunk().await?;

            let mut chunk = ChunkState::default();
            let flow = match self.fill_chunk(&mut chunk, isolating).await? {
                ChunkFlow::Commit => self.write_chunk(&mut chunk, isolating).await?,
                other => other,
            };

            match flow {
                ChunkFlow::Commit => {
                    let end_of_data = chunk.end_of_data;
                    self.commit_chunk(chunk, isolating).await?;
                    if end_of_data {
                        return Ok(StepOutcome::Completed);
                    }
                }
                ChunkFlow::RolledBack => continue,
                ChunkFlow::Failed(error) => return self.fail(error).await,
            }
        }
    }

    /// Replay chunks go through the same algorithm hooks; only the
    /// ready-to-checkpoint poll is bypassed so they stay one item long
    async fn begin_chunk(&mut self) -> Result<()> {
        let timeout = match self.algorithm.checkpoint_timeout().await? {
            0 => self.scope.runtime.services.config.transaction_timeout(),
            seconds => Duration::from_secs(seconds),
        };

        self.scope.transaction.set_transaction_timeout(timeout);
        self.scope.transaction.begin().await?;
        self.algorithm.begin_checkpoint().await?;
        self.scope.listeners.before_chunk(&self.scope.context).await?;
        Ok(())
    }

    async fn fill_chunk(&mut self, chunk: &mut ChunkState, isolating: bool) -> Result<ChunkFlow> {
        loop {
            // A stop closes the chunk early so read items are still committed
            if chunk.positions > 0 && self.scope.stop.is_stop_requested() {
                return Ok(ChunkFlow::Commit);
            }

            self.scope.listeners.before_read().await?;
            let item = match self.reader.read_item().await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    chunk.end_of_data = true;
                    return Ok(ChunkFlow::Commit);
                }
                Err(error) => {
                    match self
                        .on_item_error(ItemPhase::Read, &[], &error, chunk, isolating)
                        .await?
                    {
                        ErrorFlow::RetryInPlace | ErrorFlow::Skipped => continue,
                        ErrorFlow::Abort(flow) => return Ok(flow),
                    }
                }
            };

            self.scope.listeners.after_read(&item).await?;
            chunk.metrics.increment(MetricType::Read);
            chunk.positions += 1;

            match self.process_item(item, chunk, isolating).await? {
                ItemOutcome::Output(output) => chunk.buffer.push(output),
                ItemOutcome::Filtered => chunk.metrics.increment(MetricType::Filter),
                ItemOutcome::Skipped => {}
                ItemOutcome::Abort(flow) => return Ok(flow),
            }

            let ready = if isolating {
                true
            } else {
                self.algorithm.is_ready_to_checkpoint().await?
            };
            if ready {
                return Ok(ChunkFlow::Commit);
            }
        }
    }

    async fn process_item(
        &mut self,
        item: Value,
        chunk: &mut ChunkState,
        isolating: bool,
    ) -> Result<ItemOutcome> {
        if self.processor.is_none() {
            return Ok(ItemOutcome::Output(item));
        }

        loop {
            self.scope.listeners.before_process(&item).await?;
            let result = match self.processor.as_mut() {
                Some(processor) => processor.process_item(item.clone()).await,
                None => Ok(Some(item.clone())),
            };

            match result {
                Ok(output) => {
                    self.scope
                        .listeners
                        .after_process(&item, output.as_ref())
                        .await?;
                    return Ok(match output {
                        Some(output) => ItemOutcome::Output(output),
                        None => ItemOutcome::Filtered,
                    });
                }
                Err(error) => {
                    let items = [item.clone()];
                    match self
                        .on_item_error(ItemPhase::Process, &items, &error, chunk, isolating)
                        .await?
                    {
                        ErrorFlow::RetryInPlace => continue,
                        ErrorFlow::Skipped => return Ok(ItemOutcome::Skipped),
                        ErrorFlow::Abort(flow) => return Ok(ItemOutcome::Abort(flow)),
                    }
                }
            }
        }
    }

    async fn write_chunk(&mut self, chunk: &mut ChunkState, isolating: bool) -> Result<ChunkFlow> {
        if chunk.buffer.is_empty() {
            return Ok(ChunkFlow::Commit);
        }

        loop {
            self.scope.listeners.before_write(&chunk.buffer).await?;
            match self.writer.write_items(&chunk.buffer).await {
                Ok(()) => {
                    self.scope.listeners.after_write(&chunk.buffer).await?;
                    chunk
                        .metrics
                        .add(MetricType::Write, chunk.buffer.len() as u64);
                    return Ok(ChunkFlow::Commit);
                }
                Err(error) => {
                    let items = chunk.buffer.clone();
                    match self
                        .on_item_error(ItemPhase::Write, &items, &error, chunk, isolating)
                        .await?
                    {
                        ErrorFlow::RetryInPlace => continue,
                        ErrorFlow::Skipped => {
                            chunk.buffer.clear();
                            return Ok(ChunkFlow::Commit);
                        }
                        ErrorFlow::Abort(flow) => return Ok(flow),
                    }
                }
            }
        }
    }

    async fn on_item_error(
        &mut self,
        phase: ItemPhase,
        items: &[Value],
        error: &ArtifactError,
        chunk: &mut ChunkState,
        isolating: bool,
    ) -> Result<ErrorFlow> {
        self.scope.listeners.item_error(phase, items, error).await?;

        let skips = self.scope.execution.metrics.skip_count() + chunk.metrics.skip_count();
        let decision = self.policy.classify(phase, error, skips);
        debug!(
            step_name = %self.scope.execution.step_name,
            phase = %phase,
            error = %error,
            decision = ?decision,
            "⚠️ Item failure classified"
        );

        match decision {
            FaultDecision::Retry { rollback } => {
                self.scope.listeners.retrying(phase, items, error).await?;
                self.scope.publish(
                    events::ITEM_RETRIED,
                    json!({ "phase": phase, "error": error.to_string(), "rollback": rollback }),
                );
                if rollback {
                    Ok(ErrorFlow::Abort(self.roll_back(chunk, error).await?))
                } else {
                    Ok(ErrorFlow::RetryInPlace)
                }
            }
            FaultDecision::Skip { rollback: true } if !isolating => {
                // Re-read the chunk one item at a time so only the offender is skipped
                Ok(ErrorFlow::Abort(self.roll_back(chunk, error).await?))
            }
            FaultDecision::Skip { rollback } => {
                if rollback {
                    self.scope.transaction.rollback().await?;
                    chunk.metrics.increment(MetricType::Rollback);
                    self.scope.transaction.begin().await?;
                }
                self.record_skip(phase, items, error, chunk).await?;
                Ok(ErrorFlow::Skipped)
            }
            FaultDecision::Fail => Ok(ErrorFlow::Abort(ChunkFlow::Failed(error.clone()))),
        }
    }

    async fn record_skip(
        &mut self,
        phase: ItemPhase,
        items: &[Value],
        error: &ArtifactError,
        chunk: &mut ChunkState,
    ) -> Result<()> {
        let metric = match phase {
            ItemPhase::Read => MetricType::ReadSkip,
            ItemPhase::Process => MetricType::ProcessSkip,
            ItemPhase::Write => MetricType::WriteSkip,
        };
        chunk.metrics.increment(metric);
        self.scope.listeners.skipped(phase, items, error).await?;
        self.scope.publish(
            events::ITEM_SKIPPED,
            json!({ "phase": phase, "error": error.to_string(), "items": items.len() }),
        );
        Ok(())
    }

    async fn roll_back(&mut self, chunk: &ChunkState, error: &ArtifactError) -> Result<ChunkFlow> {
        self.scope
            .listeners
            .chunk_error(&self.scope.context, error)
            .await?;
        self.scope.transaction.rollback().await?;
        self.scope.execution.metrics.increment(MetricType::Rollback);
        self.replay_remaining = self.replay_remaining.max(chunk.positions);

        self.scope.publish(
            events::CHUNK_ROLLED_BACK,
            json!({ "error": error.to_string(), "replay_items": self.replay_remaining }),
        );
        debug!(
            step_name = %self.scope.execution.step_name,
            replay_items = self.replay_remaining,
            "↩️ Chunk rolled back, repositioning at last checkpoint"
        );

        self.reader.close().await?;
        self.writer.close().await?;
        self.open().await?;
        Ok(ChunkFlow::RolledBack)
    }

    async fn commit_chunk(&mut self, chunk: ChunkState, isolating: bool) -> Result<()> {
        let checkpoint = Checkpoint {
            reader: self.reader.checkpoint_info().await?,
            writer: self.writer.checkpoint_info().await?,
        };
        let repository = self.scope.runtime.services.repository.clone();
        repository
            .save_checkpoint(&self.scope.checkpoint_key, &checkpoint)
            .await?;

        if let Err(e) = self.scope.transaction.commit().await {
            // The data never landed, so neither may the checkpoint
            if let Err(restore) = repository
                .save_checkpoint(&self.scope.checkpoint_key, &self.last_checkpoint)
                .await
            {
                warn!(error = %restore, "Failed to restore checkpoint after failed commit");
            }
            return Err(e.into());
        }
        self.last_checkpoint = checkpoint;

        let mut metrics = chunk.metrics;
        if chunk.positions > 0 {
            metrics.increment(MetricType::Commit);
        }
        self.scope.execution.metrics.merge(&metrics);

        if isolating {
            self.replay_remaining = if chunk.end_of_data {
                0
            } else {
                self.replay_remaining.saturating_sub(1)
            };
        }
        self.algorithm.end_checkpoint().await?;

        self.scope.context.metrics = self.scope.execution.metrics;
        self.scope.listeners.after_chunk(&self.scope.context).await?;
        self.scope.persist().await?;

        if let Some(sink) = &self.scope.sink {
            sink.collect(&self.scope.context).await?;
        }

        self.scope.publish(
            events::CHUNK_COMMITTED,
            json!({
                "items_read": metrics.read_count,
                "items_written": metrics.write_count,
                "metrics": self.scope.execution.metrics,
            }),
        );
        Ok(())
    }

    async fn fail(&mut self, error: ArtifactError) -> Result<StepOutcome> {
        if let Err(listener_error) = self
            .scope
            .listeners
            .chunk_error(&self.scope.context, &error)
            .await
        {
            warn!(error = %listener_error, "Chunk error listener failed");
        }
        Ok(StepOutcome::Failed(match self.roll_back_if_active().await {
            Some(rollback) => format!("{error}; {rollback}"),
            None => error.to_string(),
        }))
    }

    /// Roll back a transaction left open by a failure; returns a description
    /// of the rollback failure so it lands on the step's failure cause
    async fn roll_back_if_active(&mut self) -> Option<String> {
        if !matches!(
            self.scope.transaction.status(),
            TransactionStatus::Active | TransactionStatus::MarkedRollback
        ) {
            return None;
        }
        match self.scope.transaction.rollback().await {
            Ok(()) => {
                self.scope.execution.metrics.increment(MetricType::Rollback);
                None
            }
            Err(e) => {
                warn!(
                    step_name = %self.scope.execution.step_name,
                    error = %e,
                    "Rollback of failed chunk did not succeed"
                );
                Some(format!("rollback failed: {e}"))
            }
        }
    }

    async fn open(&mut self) -> Result<()> {
        self.reader.open(self.last_checkpoint.reader.clone()).await?;
        self.writer.open(self.last_checkpoint.writer.clone()).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let reader = self.reader.close().await;
        let writer = self.writer.close().await;
        reader?;
        writer?;
        Ok(())
    }

    async fn close_quietly(&mut self) {
        if let Err(e) = self.close().await {
            debug!(error = %e, "Ignoring close failure on aborted step");
        }
    }
}

enum ItemOutcome {
    Output(Value),
    Filtered,
    Skipped,
    Abort(ChunkFlow),
}
