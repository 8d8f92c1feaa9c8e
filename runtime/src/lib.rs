//! # Conference Runtime
//!
//! Execution helpers shared by the conference services.
//!
//! ## Components
//!
//! - [`retry`]: bounded exponential backoff for transient failures such as
//!   optimistic transaction conflicts
//! - [`worker`]: the [`TaskWorker`] loop that drains a task queue into a
//!   [`TaskHandler`]

/// Retry logic with exponential backoff
pub mod retry;

/// Background task queue consumer
pub mod worker;

pub use retry::{RetryPolicy, retry_with_predicate};
pub use worker::{HandlerError, TaskHandler, TaskWorker};
