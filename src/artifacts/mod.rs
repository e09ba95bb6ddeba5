//! # User Artifacts
//!
//! Capabilities user code implements to plug into the kernel: item
//! readers/processors/writers, batchlets, checkpoint algorithms, deciders,
//! partition mappers/reducers/collectors/analyzers and listeners. Instances
//! are produced by an [`crate::registry::ArtifactResolver`].

pub mod batchlet;
pub mod checkpoint;
pub mod chunk;
pub mod context;
pub mod decider;
pub mod errors;
pub mod listeners;
pub mod partition;

pub use batchlet::Batchlet;
pub use checkpoint::CheckpointAlgorithm;
pub use chunk::{ItemPhase, ItemProcessor, ItemReader, ItemWriter};
pub use context::{JobContext, StepContext};
pub use decider::Decider;
pub use errors::{ArtifactError, ExceptionClassFilter};
pub use listeners::{
    ChunkListener, ItemListener, JobListener, Listener, ListenerSet, RetryListener, SkipListener,
    StepListener,
};
pub use partition::{PartitionAnalyzer, PartitionCollector, PartitionMapper, PartitionReducer};
