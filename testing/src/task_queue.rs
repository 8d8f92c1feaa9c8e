//! In-memory [`TaskQueue`].
//!
//! Tasks sit in a per-queue FIFO until a subscriber takes them. Tests that do
//! not run a worker can inspect what was enqueued with
//! [`InMemoryTaskQueue::pending`] or pull it out with
//! [`InMemoryTaskQueue::drain`] and feed it to a handler by hand.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use conference_core::task_queue::{QueueFuture, Task, TaskQueue, TaskQueueError, TaskStream};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Channel {
    tasks: Mutex<VecDeque<Vec<u8>>>,
    ready: Notify,
}

/// Process-local queue; cloning shares the queues.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTaskQueue {
    channels: Arc<Mutex<HashMap<String, Arc<Channel>>>>,
    reject_enqueue: Arc<AtomicBool>,
}

impl InMemoryTaskQueue {
    /// Create an empty queue set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every enqueue fail (`true`) or succeed again (`false`).
    pub fn set_reject_enqueue(&self, reject: bool) {
        self.reject_enqueue.store(reject, Ordering::SeqCst);
    }

    /// Payloads waiting in `queue`, oldest first.
    #[must_use]
    pub fn pending(&self, queue: &str) -> Vec<Vec<u8>> {
        self.channel(queue)
            .tasks
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .collect()
    }

    /// Remove and return everything waiting in `queue`.
    #[must_use]
    pub fn drain(&self, queue: &str) -> Vec<Vec<u8>> {
        self.channel(queue).tasks.lock().unwrap().drain(..).collect()
    }

    fn channel(&self, queue: &str) -> Arc<Channel> {
        Arc::clone(
            self.channels
                .lock()
                .unwrap()
                .entry(queue.to_string())
                .or_default(),
        )
    }
}

/// Pop the oldest payload of `channel`, waiting for one when it is empty.
///
/// Returns `None` once the channel is drained and no queue handle is left to
/// fill it.
async fn next_payload(channel: &Arc<Channel>) -> Option<Vec<u8>> {
    loop {
        let next = channel.tasks.lock().unwrap().pop_front();
        if next.is_some() {
            return next;
        }
        if Arc::strong_count(channel) == 1 {
            return None;
        }
        channel.ready.notified().await;
    }
}

impl TaskQueue for InMemoryTaskQueue {
    fn enqueue<'a>(&'a self, queue: &'a str, payload: Vec<u8>) -> QueueFuture<'a, ()> {
        Box::pin(async move {
            if self.reject_enqueue.load(Ordering::SeqCst) {
                return Err(TaskQueueError::EnqueueFailed {
                    queue: queue.to_string(),
                    reason: "simulated rejection".to_string(),
                });
            }
            let channel = self.channel(queue);
            channel.tasks.lock().unwrap().push_back(payload);
            channel.ready.notify_one();
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, queue: &'a str) -> QueueFuture<'a, TaskStream> {
        let channel = self.channel(queue);
        let queue = queue.to_string();
        Box::pin(async move {
            let stream = async_stream::stream! {
                while let Some(payload) = next_payload(&channel).await {
                    yield Ok(Task::new(queue.clone(), payload));
                }
            };
            Ok(Box::pin(stream) as TaskStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn pending_tasks_are_visible_until_drained() {
        let queue = InMemoryTaskQueue::new();
        queue.enqueue("triggers", b"one".to_vec()).await.unwrap();
        queue.enqueue("triggers", b"two".to_vec()).await.unwrap();

        assert_eq!(queue.pending("triggers"), vec![b"one".to_vec(), b"two".to_vec()]);
        assert!(queue.pending("other").is_empty());
        assert_eq!(queue.drain("triggers").len(), 2);
        assert!(queue.pending("triggers").is_empty());
    }

    #[tokio::test]
    async fn subscribers_receive_tasks_in_order_including_late_ones() {
        let queue = InMemoryTaskQueue::new();
        queue.enqueue("triggers", b"early".to_vec()).await.unwrap();

        let mut stream = queue.subscribe("triggers").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.payload, b"early".to_vec());
        assert_eq!(first.queue, "triggers");

        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.enqueue("triggers", b"late".to_vec()).await.unwrap();
        });

        let second = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.payload, b"late".to_vec());
    }

    #[tokio::test]
    async fn stream_ends_after_the_queue_is_dropped_and_drained() {
        let queue = InMemoryTaskQueue::new();
        queue.enqueue("triggers", b"last".to_vec()).await.unwrap();
        let mut stream = queue.subscribe("triggers").await.unwrap();
        drop(queue);

        let last = stream.next().await.unwrap().unwrap();
        assert_eq!(last.payload, b"last".to_vec());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn rejected_enqueue_reports_the_queue() {
        let queue = InMemoryTaskQueue::new();
        queue.set_reject_enqueue(true);

        let err = queue.enqueue("triggers", vec![]).await.unwrap_err();
        assert!(matches!(err, TaskQueueError::EnqueueFailed { queue, .. } if queue == "triggers"));
    }
}
