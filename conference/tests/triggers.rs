//! Integration tests for trigger-driven cache recomputation
//!
//! Writes go through the service, a `TaskWorker` drains the trigger queue
//! into a `TriggerHandler`, and the cached views are read back.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use conference::config::Config;
use conference::derived::ANNOUNCEMENT_PREFIX;
use conference::service::{ConferenceDraft, SessionDraft, SpeakerDraft};
use conference::{ConferenceService, LogNotifier};
use conference_core::key::Key;
use conference_runtime::TaskWorker;
use conference_testing::{InMemoryCache, InMemoryEntityStore, InMemoryTaskQueue};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

// ============================================================================
// Test Fixtures
// ============================================================================

struct Harness {
    service: ConferenceService,
    cache: InMemoryCache,
    shutdown: broadcast::Sender<()>,
    worker: tokio::task::JoinHandle<()>,
}

impl Harness {
    fn start() -> Self {
        let cache = InMemoryCache::new();
        let queue = InMemoryTaskQueue::new();
        let config = Config::default();
        let service = ConferenceService::new(
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(cache.clone()),
            Arc::new(queue.clone()),
            &config,
        );

        let (shutdown, _) = broadcast::channel(1);
        let worker = TaskWorker::new(
            "test-triggers",
            config.queue.trigger_queue.clone(),
            Arc::new(queue),
            Arc::new(service.handler(Arc::new(LogNotifier))),
            shutdown.subscribe(),
        )
        .with_retry_delay(Duration::from_millis(10))
        .spawn();

        Self {
            service,
            cache,
            shutdown,
            worker,
        }
    }

    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.worker.await.unwrap();
    }

    async fn conference(&self, name: &str, max_attendees: i64) -> Key {
        self.service
            .create_conference(
                "org",
                ConferenceDraft {
                    name: name.into(),
                    max_attendees: Some(max_attendees),
                    ..ConferenceDraft::default()
                },
            )
            .await
            .unwrap()
            .key
    }
}

/// Poll `read` until it satisfies `done`, failing after about a second.
async fn eventually<F, Fut>(mut read: F, done: impl Fn(&str) -> bool) -> String
where
    F: FnMut() -> Fut,
    Fut: Future<Output = String>,
{
    for _ in 0..100 {
        let value = read().await;
        if done(&value) {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("cached value never reached the expected state");
}

// ============================================================================
// Announcement
// ============================================================================

#[tokio::test]
async fn registrations_refresh_the_announcement() {
    let harness = Harness::start();
    let key = harness.conference("Nearly Full", 6).await;
    harness.conference("Roomy", 100).await;

    for user in ["a", "b", "c"] {
        harness.service.register(user, &key).await.unwrap();
    }

    let announcement = eventually(
        || harness.service.announcement(),
        |value| value.contains("Nearly Full"),
    )
    .await;
    assert_eq!(announcement, format!("{ANNOUNCEMENT_PREFIX}Nearly Full"));

    harness.stop().await;
}

#[tokio::test]
async fn freed_seats_clear_the_announcement() {
    let harness = Harness::start();
    let key = harness.conference("Tiny", 7).await;

    for user in ["a", "b"] {
        harness.service.register(user, &key).await.unwrap();
    }
    eventually(|| harness.service.announcement(), |v| !v.is_empty()).await;

    harness.service.unregister("a", &key).await.unwrap();
    eventually(|| harness.service.announcement(), str::is_empty).await;
    assert!(!harness.cache.contains_key("RECENT_ANNOUNCEMENTS"));

    harness.stop().await;
}

// ============================================================================
// Featured speaker
// ============================================================================

#[tokio::test]
async fn second_session_features_its_speaker() {
    let harness = Harness::start();
    let conference = harness.conference("RustConf", 50).await;
    let ann = harness
        .service
        .create_speaker(SpeakerDraft {
            first_name: "Ann".into(),
            last_name: "Smith".into(),
            institution: "MIT".into(),
        })
        .await
        .unwrap();
    let bob = harness
        .service
        .create_speaker(SpeakerDraft {
            first_name: "Bob".into(),
            last_name: "Jones".into(),
            institution: "ETH".into(),
        })
        .await
        .unwrap();

    harness
        .service
        .create_session(
            "org",
            &conference,
            SessionDraft {
                name: "Ownership".into(),
                speakers: vec![ann.key.clone()],
                ..SessionDraft::default()
            },
        )
        .await
        .unwrap();
    let second = harness
        .service
        .create_session(
            "org",
            &conference,
            SessionDraft {
                name: "Traits".into(),
                speakers: vec![bob.key.clone()],
                ..SessionDraft::default()
            },
        )
        .await
        .unwrap();

    harness
        .service
        .add_speaker_to_session("org", &second.key, &ann.key)
        .await
        .unwrap();

    let featured = eventually(
        || harness.service.featured_speaker(),
        |value| value.contains("Ann Smith"),
    )
    .await;
    assert_eq!(
        featured,
        ".\nSpeaker Ann Smith (MIT) is featured in the following sessions: Ownership, Traits.\n"
    );

    harness.stop().await;
}
