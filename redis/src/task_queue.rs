//! Redis list-backed [`TaskQueue`].
//!
//! # Architecture
//!
//! - **Enqueue**: `LPUSH {prefix}queue:{name} payload`
//! - **Consume**: `BRPOP` on a dedicated connection, so tasks come out FIFO
//!   and a blocked consumer never stalls the shared connection
//!
//! A task is removed from the list when popped. If the consumer dies before
//! handling it the task is lost; the handlers recompute derived state
//! wholesale, so the next trigger repairs anything a lost task missed.

use conference_core::task_queue::{QueueFuture, Task, TaskQueue, TaskQueueError, TaskStream};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

/// Seconds a `BRPOP` waits before re-issuing; bounds how long a consumer
/// stays blind to a dropped connection.
const POP_TIMEOUT_SECS: f64 = 5.0;

/// Redis task queue.
#[derive(Clone)]
pub struct RedisTaskQueue {
    client: Client,
    conn_manager: ConnectionManager,
    key_prefix: String,
}

impl RedisTaskQueue {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::ConnectionFailed`] if connection to Redis
    /// fails.
    pub async fn new(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self, TaskQueueError> {
        let client = Client::open(redis_url).map_err(|e| {
            TaskQueueError::ConnectionFailed(format!("Failed to create Redis client: {e}"))
        })?;

        let conn_manager = ConnectionManager::new(client.clone()).await.map_err(|e| {
            TaskQueueError::ConnectionFailed(format!(
                "Failed to create Redis connection manager: {e}"
            ))
        })?;

        Ok(Self {
            client,
            conn_manager,
            key_prefix: key_prefix.into(),
        })
    }
}

pub(crate) fn queue_key(prefix: &str, queue: &str) -> String {
    format!("{prefix}queue:{queue}")
}

impl TaskQueue for RedisTaskQueue {
    fn enqueue<'a>(&'a self, queue: &'a str, payload: Vec<u8>) -> QueueFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .lpush(queue_key(&self.key_prefix, queue), payload)
                .await
                .map_err(|e| TaskQueueError::EnqueueFailed {
                    queue: queue.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, queue: &'a str) -> QueueFuture<'a, TaskStream> {
        Box::pin(async move {
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| TaskQueueError::SubscriptionFailed {
                    queue: queue.to_string(),
                    reason: e.to_string(),
                })?;
            let key = queue_key(&self.key_prefix, queue);
            let queue = queue.to_string();

            tracing::debug!(queue = %queue, key = %key, "Consuming Redis task list");

            let stream = async_stream::stream! {
                loop {
                    let popped: Result<Option<(String, Vec<u8>)>, _> =
                        conn.brpop(&key, POP_TIMEOUT_SECS).await;
                    match popped {
                        Ok(Some((_, payload))) => yield Ok(Task::new(queue.clone(), payload)),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(TaskQueueError::ReceiveFailed(e.to_string()));
                            if e.is_io_error() || e.is_connection_dropped() {
                                // End the stream; the worker resubscribes.
                                break;
                            }
                        }
                    }
                }
            };
            Ok(Box::pin(stream) as TaskStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queues_live_under_their_own_namespace() {
        assert_eq!(queue_key("conf:", "conference-triggers"), "conf:queue:conference-triggers");
    }
}
