//! # Persistence Gateway
//!
//! The kernel never talks to storage directly; every record goes through the
//! [`JobRepository`] trait. [`InMemoryJobRepository`] is the bundled
//! implementation used for standalone operation and tests.

pub mod errors;
pub mod memory;
pub mod repository;

pub use errors::{PersistenceError, PersistenceResult};
pub use memory::InMemoryJobRepository;
pub use repository::JobRepository;
