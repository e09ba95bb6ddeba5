#![allow(clippy::doc_markdown)] // Allow technical terms like JobOperator, StepContext in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Batch Kernel
//!
//! Execution kernel for declarative batch jobs.
//!
//! ## Overview
//!
//! A job is an ordered graph of steps, decisions, flows and splits. Each step
//! is either a single unit of work (a batchlet) or a chunk-oriented
//! read/process/write pipeline. The kernel runs a job to a terminal status
//! while enforcing:
//!
//! - **Checkpointed recovery**: reader and writer positions are persisted at
//!   every commit, and a restart resumes strictly after the last one
//! - **Bounded fault tolerance**: configurable skip and retry limits
//!   classified by error kind
//! - **Transactional chunks**: one transaction per chunk, rolled back on
//!   failure
//! - **Partitioning**: fan-out of one step over a bounded worker pool with
//!   collector, analyzer and reducer hooks
//!
//! ## Module Organization
//!
//! - [`operator`] - `start` / `restart` / `stop` / `abandon` and queries
//! - [`orchestration`] - job controller, step controller, chunk loop, partitions
//! - [`state_machine`] - job and step status transitions
//! - [`job`] - in-memory job definitions, property substitution, validation
//! - [`artifacts`] - capabilities user code implements (readers, writers, ...)
//! - [`registry`] - artifact and job definition lookup
//! - [`persistence`] - repository interface with an in-memory implementation
//! - [`transaction`] - per-chunk transaction seam
//! - [`models`] - persisted records
//! - [`events`] - lifecycle event broadcasting
//! - [`config`] - configuration management
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batch_kernel::job::{ArtifactRef, JobDefinition, StepDefinition};
//! use batch_kernel::registry::JobDefinitionRegistry;
//! use batch_kernel::{JobOperator, KernelContext};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # async fn example() -> batch_kernel::Result<()> {
//! let jobs = Arc::new(JobDefinitionRegistry::new());
//! jobs.register(JobDefinition::new("cleanup").with_element(StepDefinition::batchlet(
//!     "purge",
//!     ArtifactRef::new("purgeBatchlet"),
//! )));
//!
//! let context = KernelContext::builder().job_definitions(jobs).build()?;
//! let operator = JobOperator::new(Arc::new(context));
//! let execution_id = operator.start("cleanup", HashMap::new()).await?;
//! let execution = operator.wait_for(execution_id).await?;
//! println!("cleanup ended {}", execution.batch_status);
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod execution;
pub mod job;
pub mod logging;
pub mod models;
pub mod operator;
pub mod orchestration;
pub mod persistence;
pub mod registry;
pub mod state_machine;
pub mod system_context;
pub mod transaction;

pub use artifacts::{ArtifactError, ExceptionClassFilter, JobContext, StepContext};
pub use config::{ConfigManager, KernelConfig};
pub use error::{KernelError, Result};
pub use events::{EventPublisher, LifecycleEvent};
pub use models::{JobExecution, JobInstance, JobParameters, StepExecution, StepMetrics};
pub use operator::JobOperator;
pub use persistence::{InMemoryJobRepository, JobRepository};
pub use registry::{InMemoryArtifactRegistry, JobDefinitionRegistry};
pub use state_machine::BatchStatus;
pub use system_context::KernelContext;
