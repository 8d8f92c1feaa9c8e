//! # Conference
//!
//! Inventory and consistency core of a conference-organization service.
//!
//! ## Components
//!
//! - [`inventory`]: transactional register/unregister keeping a profile's
//!   attendance list and a conference's seat count in lockstep
//! - [`query`]: compiles user conference filters into a store query under
//!   the single-inequality-field rule
//! - [`derived`]: recomputes the nearly-sold-out announcement and the
//!   featured-speaker message into the cache
//! - [`triggers`]: defers those recomputations (and the organizer's
//!   confirmation email) to a background worker
//! - [`service`]: the operations an outer API layer calls
//!
//! Backends are reached only through the `conference-core` traits, so the
//! same code runs against the in-memory implementations of
//! `conference-testing` and the Redis adapters of `conference-redis`.
//!
//! ## Example
//!
//! ```
//! use conference::{Config, ConferenceService};
//! use conference::service::ConferenceDraft;
//! use conference_testing::{InMemoryCache, InMemoryEntityStore, InMemoryTaskQueue};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), conference::ConferenceError> {
//! let service = ConferenceService::new(
//!     Arc::new(InMemoryEntityStore::new()),
//!     Arc::new(InMemoryCache::new()),
//!     Arc::new(InMemoryTaskQueue::new()),
//!     &Config::default(),
//! );
//! let conference = service
//!     .create_conference(
//!         "organizer",
//!         ConferenceDraft {
//!             name: "RustConf".into(),
//!             max_attendees: Some(100),
//!             ..ConferenceDraft::default()
//!         },
//!     )
//!     .await?;
//! service.register("attendee", &conference.key).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod derived;
pub mod error;
pub mod inventory;
pub mod metrics;
pub mod models;
pub mod query;
pub mod service;
pub mod triggers;

mod repository;

pub use config::Config;
pub use derived::DerivedCache;
pub use error::{ConferenceError, ErrorKind, Result};
pub use inventory::{InventoryManager, RegisterOutcome, UnregisterOutcome};
pub use service::ConferenceService;
pub use triggers::{LogNotifier, Notifier, Trigger, TriggerDispatcher, TriggerHandler};
