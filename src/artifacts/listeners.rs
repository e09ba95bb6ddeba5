//! # Listeners
//!
//! Observer hooks around jobs, steps, chunks and items. Every hook has a
//! no-op default so implementations only override what they need. A failing
//! hook fails the surrounding job or step; committed chunks stay committed.

use super::chunk::ItemPhase;
use super::context::{JobContext, StepContext};
use super::errors::ArtifactError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

type HookResult = Result<(), ArtifactError>;

#[async_trait]
pub trait JobListener: Send + Sync {
    async fn before_job(&self, _context: &mut JobContext) -> HookResult {
        Ok(())
    }

    async fn after_job(&self, _context: &mut JobContext) -> HookResult {
        Ok(())
    }
}

#[async_trait]
pub trait StepListener: Send + Sync {
    async fn before_step(&self, _context: &mut StepContext) -> HookResult {
        Ok(())
    }

    async fn after_step(&self, _context: &mut StepContext) -> HookResult {
        Ok(())
    }
}

#[async_trait]
pub trait ChunkListener: Send + Sync {
    async fn before_chunk(&self, _context: &StepContext) -> HookResult {
        Ok(())
    }

    /// Called before the chunk is rolled back
    async fn on_error(&self, _context: &StepContext, _error: &ArtifactError) -> HookResult {
        Ok(())
    }

    async fn after_chunk(&self, _context: &StepContext) -> HookResult {
        Ok(())
    }
}

#[async_trait]
pub trait ItemListener: Send + Sync {
    async fn before_read(&self) -> HookResult {
        Ok(())
    }

    async fn after_read(&self, _item: &Value) -> HookResult {
        Ok(())
    }

    async fn before_process(&self, _item: &Value) -> HookResult {
        Ok(())
    }

    async fn after_process(&self, _item: &Value, _result: Option<&Value>) -> HookResult {
        Ok(())
    }

    async fn before_write(&self, _items: &[Value]) -> HookResult {
        Ok(())
    }

    async fn after_write(&self, _items: &[Value]) -> HookResult {
        Ok(())
    }

    /// Any read, process or write error, before fault classification
    async fn on_item_error(
        &self,
        _phase: ItemPhase,
        _items: &[Value],
        _error: &ArtifactError,
    ) -> HookResult {
        Ok(())
    }
}

/// Notified when an error is absorbed by the skip policy
#[async_trait]
pub trait SkipListener: Send + Sync {
    /// `items` holds the skipped item (process), the failed batch (write) or
    /// nothing (read)
    async fn on_skip(&self, phase: ItemPhase, items: &[Value], error: &ArtifactError) -> HookResult;
}

/// Notified before an operation is retried
#[async_trait]
pub trait RetryListener: Send + Sync {
    async fn on_retry(&self, phase: ItemPhase, items: &[Value], error: &ArtifactError)
        -> HookResult;
}

/// One resolved listener artifact
#[derive(Clone)]
pub enum Listener {
    Job(Arc<dyn JobListener>),
    Step(Arc<dyn StepListener>),
    Chunk(Arc<dyn ChunkListener>),
    Item(Arc<dyn ItemListener>),
    Skip(Arc<dyn SkipListener>),
    Retry(Arc<dyn RetryListener>),
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Job(_) => "Job",
            Self::Step(_) => "Step",
            Self::Chunk(_) => "Chunk",
            Self::Item(_) => "Item",
            Self::Skip(_) => "Skip",
            Self::Retry(_) => "Retry",
        };
        write!(f, "Listener::{kind}")
    }
}

/// Listeners of one job or step, grouped by capability
#[derive(Clone, Default)]
pub struct ListenerSet {
    job: Vec<Arc<dyn JobListener>>,
    step: Vec<Arc<dyn StepListener>>,
    chunk: Vec<Arc<dyn ChunkListener>>,
    item: Vec<Arc<dyn ItemListener>>,
    skip: Vec<Arc<dyn SkipListener>>,
    retry: Vec<Arc<dyn RetryListener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, listener: Listener) {
        match listener {
            Listener::Job(l) => self.job.push(l),
            Listener::Step(l) => self.step.push(l),
            Listener::Chunk(l) => self.chunk.push(l),
            Listener::Item(l) => self.item.push(l),
            Listener::Skip(l) => self.skip.push(l),
            Listener::Retry(l) => self.retry.push(l),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.job.is_empty()
            && self.step.is_empty()
            && self.chunk.is_empty()
            && self.item.is_empty()
            && self.skip.is_empty()
            && self.retry.is_empty()
    }

    pub async fn before_job(&self, context: &mut JobContext) -> HookResult {
        for listener in &self.job {
            listener.before_job(context).await?;
        }
        Ok(())
    }

    pub async fn after_job(&self, context: &mut JobContext) -> HookResult {
        for listener in &self.job {
            listener.after_job(context).await?;
        }
        Ok(())
    }

    pub async fn before_step(&self, context: &mut StepContext) -> HookResult {
        for listener in &self.step {
            listener.before_step(context).await?;
        }
        Ok(())
    }

    pub async fn after_step(&self, context: &mut StepContext) -> HookResult {
        for listener in &self.step {
            listener.after_step(context).await?;
        }
        Ok(())
    }

    pub async fn before_chunk(&self, context: &StepContext) -> HookResult {
        for listener in &self.chunk {
            listener.before_chunk(context).await?;
        }
        Ok(())
    }

    pub async fn chunk_error(&self, context: &StepContext, error: &ArtifactError) -> HookResult {
        for listener in &self.chunk {
            listener.on_error(context, error).await?;
        }
        Ok(())
    }

    pub async fn after_chunk(&self, context: &StepContext) -> HookResult {
        for listener in &self.chunk {
            listener.after_chunk(context).await?;
        }
        Ok(())
    }

    pub async fn before_read(&self) -> HookResult {
        for listener in &self.item {
            listener.before_read().await?;
        }
        Ok(())
    }

    pub async fn after_read(&self, item: &Value) -> HookResult {
        for listener in &self.item {
            listener.after_read(item).await?;
        }
        Ok(())
    }

    pub async fn before_process(&self, item: &Value) -> HookResult {
        for listener in &self.item {
            listener.before_process(item).await?;
        }
        Ok(())
    }

    pub async fn after_process(&self, item: &Value, result: Option<&Value>) -> HookResult {
        for listener in &self.item {
            listener.after_process(item, result).await?;
        }
        Ok(())
    }

    pub async fn before_write(&self, items: &[Value]) -> HookResult {
        for listener in &self.item {
            listener.before_write(items).await?;
        }
        Ok(())
    }

    pub async fn after_write(&self, items: &[Value]) -> HookResult {
        for listener in &self.item {
            listener.after_write(items).await?;
        }
        Ok(())
    }

    pub async fn item_error(
        &self,
        phase: ItemPhase,
        items: &[Value],
        error: &ArtifactError,
    ) -> HookResult {
        for listener in &self.item {
            listener.on_item_error(phase, items, error).await?;
        }
        Ok(())
    }

    pub async fn skipped(&self, phase: ItemPhase, items: &[Value], error: &ArtifactError) -> HookResult {
        for listener in &self.skip {
            listener.on_skip(phase, items, error).await?;
        }
        Ok(())
    }

    pub async fn retrying(
        &self,
        phase: ItemPhase,
        items: &[Value],
        error: &ArtifactError,
    ) -> HookResult {
        for listener in &self.retry {
            listener.on_retry(phase, items, error).await?;
        }
        Ok(())
    }
}
