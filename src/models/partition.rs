use super::Properties;
use serde::{Deserialize, Serialize};

/// Fan-out description for a partitioned step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionPlan {
    pub partitions: u32,
    /// Concurrency hint; defaults to one worker per partition
    #[serde(default)]
    pub threads: Option<u32>,
    /// One property set per partition, indexed by partition number
    #[serde(default)]
    pub partition_properties: Vec<Properties>,
    /// On restart, discard previous partition results and run all partitions
    #[serde(default)]
    pub partitions_override: bool,
}

impl PartitionPlan {
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions,
            ..Self::default()
        }
    }

    /// Effective worker count, capped by the kernel-wide maximum
    pub fn worker_count(&self, max_threads: usize) -> usize {
        let hint = self.threads.unwrap_or(self.partitions) as usize;
        hint.min(max_threads).max(1)
    }

    pub fn properties_for(&self, partition: u32) -> Properties {
        self.partition_properties
            .get(partition as usize)
            .cloned()
            .unwrap_or_default()
    }
}
