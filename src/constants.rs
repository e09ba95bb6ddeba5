//! # Kernel Constants
//!
//! Lifecycle event names, metric names and operational defaults shared by the
//! job and step controllers.

/// Lifecycle events published through [`crate::events::EventPublisher`]
pub mod events {
    // Job lifecycle events
    pub const JOB_STARTING: &str = "job.starting";
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_STOPPING: &str = "job.stopping";
    pub const JOB_STOPPED: &str = "job.stopped";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_FAILED: &str = "job.failed";
    pub const JOB_ABANDONED: &str = "job.abandoned";

    // Step lifecycle events
    pub const STEP_STARTED: &str = "step.started";
    pub const STEP_STOPPING: &str = "step.stopping";
    pub const STEP_STOPPED: &str = "step.stopped";
    pub const STEP_COMPLETED: &str = "step.completed";
    pub const STEP_FAILED: &str = "step.failed";
    pub const STEP_SKIPPED_COMPLETE: &str = "step.skipped_complete";

    // Chunk processing events
    pub const CHUNK_COMMITTED: &str = "chunk.committed";
    pub const CHUNK_ROLLED_BACK: &str = "chunk.rolled_back";
    pub const ITEM_SKIPPED: &str = "item.skipped";
    pub const ITEM_RETRIED: &str = "item.retried";

    // Partition events
    pub const PARTITION_COMPLETED: &str = "partition.completed";
    pub const PARTITION_FAILED: &str = "partition.failed";
}

/// Operational defaults used when neither the job definition nor the
/// kernel configuration provide a value
pub mod defaults {
    /// Items per chunk for the item-count checkpoint policy
    pub const ITEM_COUNT: u32 = 10;

    /// Transaction timeout applied around each chunk, in seconds
    pub const TRANSACTION_TIMEOUT_SECONDS: u64 = 180;

    /// Upper bound on concurrently running partitions of one step
    pub const MAX_PARTITION_THREADS: usize = 16;

    /// Capacity of the lifecycle event broadcast channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;

    /// Interval at which waiters re-check persisted status
    pub const WAIT_POLL_INTERVAL_MS: u64 = 1000;
}

/// Well-known artifact error kinds raised by the kernel itself
pub mod error_kinds {
    pub const ARTIFACT_NOT_FOUND: &str = "kernel.artifact_not_found";
    pub const ARTIFACT_TYPE_MISMATCH: &str = "kernel.artifact_type_mismatch";
    pub const PARTITION_PLAN: &str = "kernel.partition_plan";
}
