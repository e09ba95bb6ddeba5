//! # Orchestration Engine
//!
//! Runs job executions on the tokio runtime.
//!
//! ## Core Components
//!
//! - **JobController**: walks the job's elements, evaluates transitions and
//!   records the final job status
//! - **StepController**: drives one step or partition through its lifecycle
//! - **ChunkProcessor**: the read/process/write loop with checkpoints, skips
//!   and retries
//! - **PartitionCoordinator**: fans a step out over a bounded worker pool
//!   and folds partition results back in
//!
//! Every running execution shares one [`JobRuntime`]; each step body gets its
//! own [`StepScope`].

pub mod batchlet_step;
pub mod chunk;
pub mod job_controller;
pub mod navigator;
pub mod partition;
pub mod runtime;
pub mod step_controller;

pub use chunk::{ChunkProcessor, FaultDecision, FaultPolicy, ItemCountCheckpointAlgorithm};
pub use job_controller::{JobController, SequenceOutcome};
pub use navigator::{navigate, Navigation};
pub use partition::{PartitionCoordinator, PartitionMessage, PartitionSink};
pub use runtime::{JobRuntime, StepOutcome, StepScope};
pub use step_controller::{PartitionAssignment, StepController};
