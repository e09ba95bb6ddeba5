//! # Registry Infrastructure
//!
//! Lookup seams between the kernel and user code:
//!
//! - [`ArtifactResolver`] turns an artifact reference into an instance of the
//!   requested capability. [`InMemoryArtifactRegistry`] resolves names
//!   against registered factories.
//! - [`JobDefinitionSource`] supplies job definitions by name.
//!   [`JobDefinitionRegistry`] keeps them in memory.

pub mod artifact_registry;
pub mod job_registry;

pub use artifact_registry::{ArtifactResolver, InMemoryArtifactRegistry};
pub use job_registry::{JobDefinitionRegistry, JobDefinitionSource};
