//! # Chunk Processing
//!
//! The read-process-write loop with per-chunk transactions and checkpoints,
//! the skip/retry evaluator and the built-in checkpoint algorithm.

pub mod checkpoint;
pub mod chunk_processor;
pub mod fault_policy;

pub use checkpoint::{checkpoint_algorithm_for, ItemCountCheckpointAlgorithm};
pub use chunk_processor::ChunkProcessor;
pub use fault_policy::{FaultDecision, FaultPolicy};
