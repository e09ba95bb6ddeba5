use super::errors::ArtifactError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Phase of the chunk loop an item-level fault happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemPhase {
    Read,
    Process,
    Write,
}

impl fmt::Display for ItemPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Process => "process",
            Self::Write => "write",
        })
    }
}

/// Source of items for a chunk step
#[async_trait]
pub trait ItemReader: Send + Sync {
    /// Position the reader; `checkpoint` is the value last returned by
    /// [`ItemReader::checkpoint_info`] at a committed boundary, if any
    async fn open(&mut self, checkpoint: Option<Value>) -> Result<(), ArtifactError>;

    /// Next item, or `None` at end of data
    async fn read_item(&mut self) -> Result<Option<Value>, ArtifactError>;

    async fn checkpoint_info(&mut self) -> Result<Option<Value>, ArtifactError> {
        Ok(None)
    }

    async fn close(&mut self) -> Result<(), ArtifactError> {
        Ok(())
    }
}

/// Transforms one item; returning `None` filters the item out
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    async fn process_item(&mut self, item: Value) -> Result<Option<Value>, ArtifactError>;
}

/// Sink for the items of one chunk
#[async_trait]
pub trait ItemWriter: Send + Sync {
    async fn open(&mut self, checkpoint: Option<Value>) -> Result<(), ArtifactError>;

    async fn write_items(&mut self, items: &[Value]) -> Result<(), ArtifactError>;

    async fn checkpoint_info(&mut self) -> Result<Option<Value>, ArtifactError> {
        Ok(None)
    }

    async fn close(&mut self) -> Result<(), ArtifactError> {
        Ok(())
    }
}
