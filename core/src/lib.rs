//! # Conference Core
//!
//! Interfaces the conference inventory services are written against.
//!
//! The inventory core never talks to a database, cache or queue directly. It
//! consumes three collaborators through the traits defined here, injected as
//! `Arc<dyn _>`:
//!
//! - [`entity_store::EntityStore`]: transactional document store with
//!   ancestor keys ([`key::Key`]) and restricted single-kind queries
//! - [`cache::Cache`]: fast named-value cache for derived data
//! - [`task_queue::TaskQueue`]: at-least-once queue for deferred side effects
//!
//! ## Architecture Principles
//!
//! - The store is the only source of truth
//! - Derived values are recomputed wholesale, never patched
//! - Side effects leave the request path through the task queue
//! - Every backend is swappable; `conference-testing` provides in-memory ones

pub mod cache;
pub mod entity_store;
pub mod key;
pub mod task_queue;

pub use cache::{Cache, CacheError};
pub use entity_store::{
    Direction, Document, Entity, EntityStore, EntityStoreError, FilterOp, PropertyFilter, Query,
    SortOrder, Transaction, TransactionOptions,
};
pub use key::{Key, KeyError, KeyId};
pub use task_queue::{Task, TaskQueue, TaskQueueError, TaskStream};
