//! Conference demo.
//!
//! Runs a scripted scenario against the full stack: service, trigger worker
//! and periodic announcement refresh. Backends are in memory unless
//! `REDIS_URL` is set, in which case cache and task queue use Redis.
//!
//! ```sh
//! RUST_LOG=info,conference=debug cargo run --bin demo
//! ```

use conference::query::ConferenceFilter;
use conference::service::{ConferenceDraft, ProfileUpdate, SessionDraft, SpeakerDraft};
use conference::triggers::spawn_announcement_refresh;
use conference::{Config, ConferenceError, ConferenceService, LogNotifier, metrics};
use conference_core::cache::Cache;
use conference_core::task_queue::TaskQueue;
use conference_redis::{RedisCache, RedisTaskQueue};
use conference_runtime::TaskWorker;
use conference_testing::{InMemoryCache, InMemoryEntityStore, InMemoryTaskQueue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,conference=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    metrics::register_metrics();

    let (cache, queue): (Arc<dyn Cache>, Arc<dyn TaskQueue>) = if std::env::var("REDIS_URL").is_ok() {
        info!(redis_url = %config.redis.url, "Using Redis cache and task queue");
        (
            Arc::new(RedisCache::new(&config.redis.url, config.redis.key_prefix.clone()).await?),
            Arc::new(RedisTaskQueue::new(&config.redis.url, config.redis.key_prefix.clone()).await?),
        )
    } else {
        info!("Using in-memory cache and task queue");
        (Arc::new(InMemoryCache::new()), Arc::new(InMemoryTaskQueue::new()))
    };

    let service = ConferenceService::new(
        Arc::new(InMemoryEntityStore::new()),
        cache,
        Arc::clone(&queue),
        &config,
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    let worker = TaskWorker::new(
        "triggers",
        config.queue.trigger_queue.clone(),
        queue,
        Arc::new(service.handler(Arc::new(LogNotifier))),
        shutdown_tx.subscribe(),
    )
    .with_retry_delay(config.queue.worker_retry_delay())
    .spawn();
    let refresh = spawn_announcement_refresh(
        service.dispatcher().clone(),
        config.cache.announcement_refresh(),
        shutdown_tx.subscribe(),
    );

    run_scenario(&service).await?;

    // Give the worker a moment to drain the queue.
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!(announcement = %service.announcement().await, "Announcement");
    info!(featured = %service.featured_speaker().await, "Featured speaker");

    shutdown_tx.send(()).ok();
    worker.await?;
    refresh.await?;
    info!("Demo finished");
    Ok(())
}

async fn run_scenario(service: &ConferenceService) -> anyhow::Result<()> {
    service
        .save_profile(
            "organizer",
            ProfileUpdate {
                main_email: Some("organizer@example.com".into()),
                ..ProfileUpdate::default()
            },
        )
        .await?;

    let small = service
        .create_conference(
            "organizer",
            ConferenceDraft {
                name: "Borrow Checker Summit".into(),
                city: Some("Lisbon".into()),
                topics: vec!["Rust".into(), "Compilers".into()],
                max_attendees: Some(3),
                ..ConferenceDraft::default()
            },
        )
        .await?;
    service
        .create_conference(
            "organizer",
            ConferenceDraft {
                name: "Async Days".into(),
                city: Some("Berlin".into()),
                max_attendees: Some(200),
                ..ConferenceDraft::default()
            },
        )
        .await?;

    for attendee in ["ada", "grace", "linus", "barbara"] {
        match service.register(attendee, &small.key).await {
            Ok(_) => info!(attendee, "Registered"),
            Err(ConferenceError::SeatsUnavailable) => warn!(attendee, "Sold out"),
            Err(e) => return Err(e.into()),
        }
    }
    service.unregister("linus", &small.key).await?;

    let speaker = service
        .create_speaker(SpeakerDraft {
            first_name: "Niko".into(),
            last_name: "Matsakis".into(),
            institution: "Rust Project".into(),
        })
        .await?;
    for name in ["Ownership", "Lifetimes"] {
        service
            .create_session(
                "organizer",
                &small.key,
                SessionDraft {
                    name: name.into(),
                    speakers: vec![speaker.key.clone()],
                    ..SessionDraft::default()
                },
            )
            .await?;
    }

    let filtered = service
        .query_conferences(&[
            ConferenceFilter::new("CITY", "EQ", "Lisbon"),
            ConferenceFilter::new("MAX_ATTENDEES", "LT", "10"),
        ])
        .await?;
    info!(matches = filtered.len(), "Filtered conferences");

    let seats = service.conference(&small.key).await?.seats_available;
    info!(seats_available = seats, "Scenario complete");
    Ok(())
}
