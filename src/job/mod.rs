//! # Job Definitions
//!
//! The in-memory job model consumed by the job controller, the property
//! substitution applied to it at runtime, and the checks run before a job
//! is allowed to start.

pub mod model;
pub mod properties;
pub mod validation;

pub use model::{
    wildcard_match, ArtifactRef, CheckpointPolicy, ChunkDefinition, DecisionDefinition,
    ExecutionElement, FlowDefinition, JobDefinition, PartitionDefinition, SplitDefinition,
    StepBody, StepDefinition, Transition,
};
pub use properties::PropertyResolver;
pub use validation::validate_job;
