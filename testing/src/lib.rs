//! # Conference Testing
//!
//! In-memory backends for the `conference-core` traits.
//!
//! This crate provides:
//! - [`InMemoryEntityStore`]: versioned document store with optimistic
//!   transactions, datastore query semantics and conflict injection
//! - [`InMemoryCache`]: `HashMap` cache with outage simulation
//! - [`InMemoryTaskQueue`]: FIFO queues with inspection helpers
//!
//! They are complete enough to run the services end to end, which is what the
//! `demo` binary does.
//!
//! ## Example
//!
//! ```
//! use conference_core::entity_store::{Document, EntityStore};
//! use conference_core::key::Key;
//! use conference_testing::InMemoryEntityStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryEntityStore::new();
//! let key = Key::named("Profile", "alice");
//! store.put(Document { key: key.clone(), properties: Default::default() }).await?;
//! assert!(store.get(&key).await?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod entity_store;
pub mod task_queue;

pub use cache::InMemoryCache;
pub use entity_store::InMemoryEntityStore;
pub use task_queue::InMemoryTaskQueue;
