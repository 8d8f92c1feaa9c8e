//! Task queue abstraction for asynchronous side effects.
//!
//! Writes enqueue tasks (cache recomputation, notification email) instead of
//! performing the side effect inline. A worker subscribes to the queue and
//! processes tasks off the request path.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Write request  │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ 1. Commit to    │◄─── Source of truth
//! │  entity store   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ 2. Enqueue task │◄─── Best effort, at-least-once
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Worker      │──► recompute derived cache / send email
//! └─────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **Store first**: tasks are enqueued only after the write committed
//! - **At-least-once delivery**: a task may be processed more than once
//! - **Idempotency**: handlers overwrite, they never increment
//! - **No cross-queue ordering**: tasks on different queues are unordered

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during task queue operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskQueueError {
    /// Failed to reach the queue backend.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to enqueue a task.
    #[error("Enqueue failed for queue '{queue}': {reason}")]
    EnqueueFailed {
        /// Target queue
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to a queue.
    #[error("Subscription failed for queue '{queue}': {reason}")]
    SubscriptionFailed {
        /// Queue that could not be consumed
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to receive the next task.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}

/// A unit of deferred work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Queue the task was taken from.
    pub queue: String,
    /// Opaque, handler-defined payload.
    pub payload: Vec<u8>,
}

impl Task {
    /// Create a task.
    #[must_use]
    pub fn new(queue: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            queue: queue.into(),
            payload,
        }
    }
}

/// Stream of tasks from a subscription.
pub type TaskStream = Pin<Box<dyn Stream<Item = Result<Task, TaskQueueError>> + Send>>;

/// Boxed future returned by queue operations.
pub type QueueFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TaskQueueError>> + Send + 'a>>;

/// Queue with at-least-once delivery.
///
/// # Dyn Compatibility
///
/// Explicit `Pin<Box<dyn Future>>` returns keep the trait usable as
/// `Arc<dyn TaskQueue>`.
pub trait TaskQueue: Send + Sync {
    /// Append a task to `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::EnqueueFailed`] when the task could not be
    /// accepted.
    fn enqueue<'a>(&'a self, queue: &'a str, payload: Vec<u8>) -> QueueFuture<'a, ()>;

    /// Consume tasks from `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::SubscriptionFailed`] when the queue cannot be
    /// consumed.
    fn subscribe<'a>(&'a self, queue: &'a str) -> QueueFuture<'a, TaskStream>;
}
