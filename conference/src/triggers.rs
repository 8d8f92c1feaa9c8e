//! Asynchronous triggers: cache recomputation and notification email.
//!
//! Writes never recompute derived caches inline. They hand a [`Trigger`] to
//! the [`TriggerDispatcher`], which enqueues it on the task queue; a
//! `TaskWorker` running a [`TriggerHandler`] picks it up off the request path.
//!
//! ```text
//! write ─► commit ─► dispatch(Trigger) ─► queue ─► TaskWorker ─► TriggerHandler
//!                      (best effort)                               ├─ DerivedCache
//!                                                                  └─ Notifier
//! ```
//!
//! Dispatch is best effort: a trigger that cannot be enqueued is logged and
//! counted, never reported to the write that produced it. Delivery is
//! at-least-once; every handler path overwrites rather than increments, so
//! duplicates are harmless.

use crate::derived::DerivedCache;
use crate::error::{ConferenceError, Result};
use crate::metrics;
use async_trait::async_trait;
use conference_core::key::Key;
use conference_core::task_queue::TaskQueue;
use conference_runtime::worker::{HandlerError, TaskHandler};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Deferred side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    /// Rebuild the nearly-sold-out announcement.
    RecomputeAnnouncement,
    /// Rebuild the featured-speaker message for a session's conference.
    RecomputeFeaturedSpeaker {
        /// Session whose speakers are checked.
        session_key: Key,
    },
    /// Tell an organizer their conference was created.
    SendConfirmationEmail {
        /// Recipient.
        email: String,
        /// Name of the new conference.
        conference_name: String,
    },
}

impl Trigger {
    /// Short name used in logs and metric labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RecomputeAnnouncement => "recompute_announcement",
            Self::RecomputeFeaturedSpeaker { .. } => "recompute_featured_speaker",
            Self::SendConfirmationEmail { .. } => "send_confirmation_email",
        }
    }

    /// Binary payload for the task queue.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::Serialization`] if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a task payload.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::Serialization`] for payloads not produced by
    /// [`Trigger::encode`].
    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(payload)?)
    }
}

/// Enqueues triggers on the trigger queue.
#[derive(Clone)]
pub struct TriggerDispatcher {
    queue: Arc<dyn TaskQueue>,
    queue_name: String,
}

impl TriggerDispatcher {
    /// Dispatcher writing to `queue_name`.
    #[must_use]
    pub fn new(queue: Arc<dyn TaskQueue>, queue_name: impl Into<String>) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
        }
    }

    /// Queue consumed by the trigger worker.
    #[must_use]
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Enqueue `trigger`. Failures are logged and counted, never returned.
    pub async fn dispatch(&self, trigger: Trigger) {
        let name = trigger.name();
        let payload = match trigger.encode() {
            Ok(payload) => payload,
            Err(e) => {
                metrics::record_trigger_failed(name);
                warn!(trigger = name, error = %e, "Failed to encode trigger");
                return;
            }
        };

        match self.queue.enqueue(&self.queue_name, payload).await {
            Ok(()) => {
                metrics::record_trigger_enqueued(name);
                debug!(trigger = name, queue = %self.queue_name, "Trigger enqueued");
            }
            Err(e) => {
                metrics::record_trigger_failed(name);
                warn!(trigger = name, error = %e, "Failed to enqueue trigger, dropping it");
            }
        }
    }
}

/// Outbound notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Confirm to an organizer that their conference was created.
    ///
    /// # Errors
    ///
    /// Delivery failures.
    async fn conference_created(
        &self,
        email: &str,
        conference_name: &str,
    ) -> std::result::Result<(), HandlerError>;
}

/// [`Notifier`] that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn conference_created(
        &self,
        email: &str,
        conference_name: &str,
    ) -> std::result::Result<(), HandlerError> {
        info!(
            to = email,
            subject = "You created a new Conference!",
            conference = conference_name,
            "Confirmation email sent"
        );
        Ok(())
    }
}

/// Worker-side handler routing triggers to their implementation.
#[derive(Clone)]
pub struct TriggerHandler {
    derived: Arc<DerivedCache>,
    notifier: Arc<dyn Notifier>,
}

impl TriggerHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(derived: Arc<DerivedCache>, notifier: Arc<dyn Notifier>) -> Self {
        Self { derived, notifier }
    }

    /// Execute one trigger.
    ///
    /// # Errors
    ///
    /// Store failures from recomputation, [`ConferenceError::NotFound`] for a
    /// session that vanished, or [`ConferenceError::Notification`].
    pub async fn execute(&self, trigger: &Trigger) -> Result<()> {
        debug!(trigger = trigger.name(), "Executing trigger");
        match trigger {
            Trigger::RecomputeAnnouncement => {
                self.derived.recompute_announcement().await?;
            }
            Trigger::RecomputeFeaturedSpeaker { session_key } => {
                self.derived.recompute_featured_speaker(session_key).await?;
            }
            Trigger::SendConfirmationEmail {
                email,
                conference_name,
            } => {
                self.notifier
                    .conference_created(email, conference_name)
                    .await
                    .map_err(|e| ConferenceError::Notification(e.to_string()))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for TriggerHandler {
    async fn handle(&self, payload: &[u8]) -> std::result::Result<(), HandlerError> {
        let trigger = Trigger::decode(payload)?;
        self.execute(&trigger).await?;
        Ok(())
    }
}

/// Periodically enqueue [`Trigger::RecomputeAnnouncement`] until `shutdown`
/// fires.
///
/// The first tick fires immediately, so the announcement is warm right after
/// startup.
#[must_use]
pub fn spawn_announcement_refresh(
    dispatcher: TriggerDispatcher,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "Announcement refresh started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = interval.tick() => dispatcher.dispatch(Trigger::RecomputeAnnouncement).await,
            }
        }

        info!("Announcement refresh stopped");
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use conference_testing::{InMemoryCache, InMemoryEntityStore, InMemoryTaskQueue};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn conference_created(
            &self,
            email: &str,
            conference_name: &str,
        ) -> std::result::Result<(), HandlerError> {
            self.sent
                .lock()
                .unwrap()
                .push((email.to_string(), conference_name.to_string()));
            Ok(())
        }
    }

    #[test]
    fn triggers_survive_the_queue_encoding() {
        let trigger = Trigger::RecomputeFeaturedSpeaker {
            session_key: Key::with_parent(&Key::named("Profile", "org"), "Conference", 3),
        };

        assert_eq!(Trigger::decode(&trigger.encode().unwrap()).unwrap(), trigger);
        assert!(Trigger::decode(b"\xff\xff\xff\xff").is_err());
    }

    #[tokio::test]
    async fn dispatch_is_best_effort() {
        let queue = InMemoryTaskQueue::new();
        let dispatcher = TriggerDispatcher::new(Arc::new(queue.clone()), "triggers");

        dispatcher.dispatch(Trigger::RecomputeAnnouncement).await;
        queue.set_reject_enqueue(true);
        dispatcher.dispatch(Trigger::RecomputeAnnouncement).await;

        assert_eq!(queue.pending("triggers").len(), 1);
    }

    #[tokio::test]
    async fn handler_routes_email_to_the_notifier() {
        let derived = Arc::new(DerivedCache::new(
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(InMemoryCache::new()),
            CacheConfig::default(),
        ));
        let notifier = Arc::new(RecordingNotifier::default());
        let handler = TriggerHandler::new(derived, notifier.clone());

        let payload = Trigger::SendConfirmationEmail {
            email: "ada@example.com".into(),
            conference_name: "RustConf".into(),
        }
        .encode()
        .unwrap();
        handler.handle(&payload).await.unwrap();

        assert_eq!(
            notifier.sent.lock().unwrap().as_slice(),
            &[("ada@example.com".to_string(), "RustConf".to_string())]
        );
        assert!(handler.handle(b"garbage").await.is_err());
    }

    #[tokio::test]
    async fn refresh_enqueues_until_shutdown() {
        let queue = InMemoryTaskQueue::new();
        let dispatcher = TriggerDispatcher::new(Arc::new(queue.clone()), "triggers");
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = spawn_announcement_refresh(dispatcher, Duration::from_millis(5), shutdown_rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        let pending = queue.pending("triggers");
        assert!(!pending.is_empty());
        assert_eq!(
            Trigger::decode(&pending[0]).unwrap(),
            Trigger::RecomputeAnnouncement
        );
    }
}
