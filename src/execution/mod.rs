//! # Execution Primitives
//!
//! Cross-task signalling used by the operator and the controllers: the
//! advisory [`StopToken`] and the per-execution [`CompletionRegistry`].

pub mod completion;
pub mod stop;

pub use completion::CompletionRegistry;
pub use stop::StopToken;
