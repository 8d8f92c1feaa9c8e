//! Background worker draining a task queue.
//!
//! [`TaskWorker`] owns the subscribe-process-reconnect loop so that handlers
//! only have to implement [`TaskHandler::handle`].
//!
//! ```text
//! loop {
//!     subscribe(queue):
//!         loop {
//!             - handle task
//!             - log handler errors, keep going
//!             - stop on shutdown signal
//!         }
//!     stream ended or subscribe failed:
//!         wait retry_delay, subscribe again
//! }
//! ```
//!
//! Handler errors never stop the worker. Delivery is at-least-once, so
//! handlers must be idempotent.

use async_trait::async_trait;
use conference_core::task_queue::{Task, TaskQueue, TaskQueueError};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Error type returned by handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes one task payload.
///
/// Implementors must be `Send + Sync + 'static` because one handler instance
/// is shared by the worker task for its whole lifetime.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Handle a raw task payload.
    ///
    /// # Errors
    ///
    /// Any error is logged by the worker; the task is not redelivered by the
    /// worker itself.
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError>;
}

/// Long-running consumer of one queue.
pub struct TaskWorker {
    name: String,
    queue: String,
    task_queue: Arc<dyn TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    shutdown: broadcast::Receiver<()>,
    retry_delay: Duration,
}

impl TaskWorker {
    /// Create a worker with the default 5 second reconnect delay.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        queue: impl Into<String>,
        task_queue: Arc<dyn TaskQueue>,
        handler: Arc<dyn TaskHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            name: name.into(),
            queue: queue.into(),
            task_queue,
            handler,
            shutdown,
            retry_delay: Duration::from_secs(5),
        }
    }

    /// Override the reconnect delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run the worker on the current tokio runtime.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(worker = %self.name, queue = %self.queue, "Task worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => break,
                subscribed = self.task_queue.subscribe(&self.queue) => {
                    match subscribed {
                        Ok(mut stream) => {
                            debug!(worker = %self.name, queue = %self.queue, "Subscribed");
                            if self.drain(&mut stream).await {
                                break;
                            }
                            warn!(
                                worker = %self.name,
                                retry_delay_ms = self.retry_delay.as_millis(),
                                "Task stream ended, resubscribing"
                            );
                        }
                        Err(e) => {
                            error!(
                                worker = %self.name,
                                error = %e,
                                retry_delay_ms = self.retry_delay.as_millis(),
                                "Failed to subscribe to task queue"
                            );
                        }
                    }
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => break,
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        info!(worker = %self.name, "Task worker stopped");
    }

    /// Process tasks until the stream ends (`false`) or shutdown (`true`).
    async fn drain<S>(&mut self, stream: &mut S) -> bool
    where
        S: Stream<Item = Result<Task, TaskQueueError>> + Unpin + Send,
    {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => return true,
                next = stream.next() => match next {
                    Some(Ok(task)) => self.process(&task).await,
                    Some(Err(e)) => {
                        error!(worker = %self.name, error = %e, "Error receiving task");
                    }
                    None => return false,
                },
            }
        }
    }

    async fn process(&self, task: &Task) {
        match self.handler.handle(&task.payload).await {
            Ok(()) => {
                metrics::counter!("conference.worker.tasks.total", "outcome" => "ok").increment(1);
            }
            Err(e) => {
                metrics::counter!("conference.worker.tasks.total", "outcome" => "error")
                    .increment(1);
                error!(worker = %self.name, queue = %task.queue, error = %e, "Task handler failed");
            }
        }
    }
}
