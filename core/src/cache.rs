//! Fast key/value cache for derived values.
//!
//! The cache holds values recomputed from authoritative store data. It is never
//! a source of truth: entries may vanish at any time, and a missing entry is a
//! meaningful state in its own right (e.g. "no announcement"). Readers must not
//! recompute on a miss.
//!
//! # Implementations
//!
//! - `InMemoryCache` (in `conference-testing`): process-local, with failure
//!   injection for tests
//! - `RedisCache` (in `conference-redis`): production

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised by cache backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The cache could not be reached.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with something unexpected.
    #[error("Cache backend error: {0}")]
    Backend(String),
}

/// Boxed future returned by cache operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Named string cache.
pub trait Cache: Send + Sync {
    /// Current value, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend fails.
    fn get<'a>(&'a self, name: &'a str) -> CacheFuture<'a, Option<String>>;

    /// Replace the value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend fails.
    fn set<'a>(&'a self, name: &'a str, value: String) -> CacheFuture<'a, ()>;

    /// Remove the value. Deleting an absent name is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend fails.
    fn delete<'a>(&'a self, name: &'a str) -> CacheFuture<'a, ()>;
}
