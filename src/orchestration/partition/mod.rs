//! # Partitioned Steps
//!
//! A partitioned step runs one sub-execution per partition on a bounded
//! worker pool. Partitions report collector payloads and their final status
//! back to the coordinating task over an mpsc channel, where the analyzer
//! sees them in arrival order.

pub mod coordinator;

pub use coordinator::PartitionCoordinator;

use crate::artifacts::{ArtifactError, PartitionCollector, StepContext};
use crate::state_machine::BatchStatus;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum PartitionMessage {
    Collected {
        partition: u32,
        data: Value,
    },
    Finished {
        partition: u32,
        batch_status: BatchStatus,
        exit_status: String,
    },
}

/// Partition-side end of the channel to the coordinator
#[derive(Clone)]
pub struct PartitionSink {
    pub partition: u32,
    sender: mpsc::UnboundedSender<PartitionMessage>,
    collector: Option<Arc<dyn PartitionCollector>>,
}

impl PartitionSink {
    pub fn new(
        partition: u32,
        sender: mpsc::UnboundedSender<PartitionMessage>,
        collector: Option<Arc<dyn PartitionCollector>>,
    ) -> Self {
        Self {
            partition,
            sender,
            collector,
        }
    }

    pub fn set_collector(&mut self, collector: Arc<dyn PartitionCollector>) {
        self.collector = Some(collector);
    }

    /// Run the collector and forward its payload, if any
    pub async fn collect(&self, context: &StepContext) -> Result<(), ArtifactError> {
        let Some(collector) = &self.collector else {
            return Ok(());
        };
        if let Some(data) = collector.collect_partition_data(context).await? {
            self.send(PartitionMessage::Collected {
                partition: self.partition,
                data,
            });
        }
        Ok(())
    }

    pub fn finished(&self, batch_status: BatchStatus, exit_status: String) {
        self.send(PartitionMessage::Finished {
            partition: self.partition,
            batch_status,
            exit_status,
        });
    }

    fn send(&self, message: PartitionMessage) {
        // The coordinator only stops listening once every partition is done
        if self.sender.send(message).is_err() {
            tracing::debug!(partition = self.partition, "Partition channel closed");
        }
    }
}

impl std::fmt::Debug for PartitionSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionSink")
            .field("partition", &self.partition)
            .field("has_collector", &self.collector.is_some())
            .finish()
    }
}
