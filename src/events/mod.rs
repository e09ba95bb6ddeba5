//! # Lifecycle Events
//!
//! Fire-and-forget notifications for job, step, chunk and item lifecycle
//! transitions. Event names live in [`crate::constants::events`].
//!
//! ```rust
//! use batch_kernel::constants::events;
//! use batch_kernel::events::{EventPublisher, LifecycleEvent};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let publisher = EventPublisher::new(16);
//! let mut receiver = publisher.subscribe();
//!
//! publisher
//!     .publish(LifecycleEvent::for_job(events::JOB_STARTED, 1, json!({})))
//!     .unwrap();
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.name, "job.started");
//! # });
//! ```

pub mod publisher;

pub use publisher::{EventPublisher, LifecycleEvent, PublishError};
