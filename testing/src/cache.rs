//! In-memory [`Cache`] for tests and the demo binary.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use conference_core::cache::{Cache, CacheError, CacheFuture};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// `HashMap`-backed cache.
///
/// [`InMemoryCache::set_unavailable`] turns every operation into
/// [`CacheError::Unavailable`], which is how tests exercise the
/// "cache failures never fail the caller" paths.
///
/// # Example
///
/// ```
/// use conference_testing::InMemoryCache;
/// use conference_core::cache::Cache;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = InMemoryCache::new();
/// cache.set("RECENT_ANNOUNCEMENTS", "Last chance!".to_string()).await?;
/// assert_eq!(cache.value("RECENT_ANNOUNCEMENTS").as_deref(), Some("Last chance!"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryCache {
    data: Arc<RwLock<HashMap<String, String>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage (`true`) or recover from one (`false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Synchronous peek, bypassing the outage switch.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<String> {
        self.data.read().unwrap().get(name).cloned()
    }

    /// Check if an entry exists.
    #[must_use]
    pub fn contains_key(&self, name: &str) -> bool {
        self.data.read().unwrap().contains_key(name)
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

impl Cache for InMemoryCache {
    fn get<'a>(&'a self, name: &'a str) -> CacheFuture<'a, Option<String>> {
        Box::pin(async move {
            self.check()?;
            Ok(self.value(name))
        })
    }

    fn set<'a>(&'a self, name: &'a str, value: String) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.check()?;
            self.data.write().unwrap().insert(name.to_string(), value);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, name: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.check()?;
            self.data.write().unwrap().remove(name);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let cache = InMemoryCache::new();

        cache.set("k", "v".to_string()).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        // Deleting a missing entry is not an error.
        cache.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn outage_fails_every_operation() {
        let cache = InMemoryCache::new();
        cache.set("k", "v".to_string()).await.unwrap();
        cache.set_unavailable(true);

        assert!(matches!(cache.get("k").await, Err(CacheError::Unavailable(_))));
        assert!(cache.set("k", "w".to_string()).await.is_err());
        assert_eq!(cache.value("k").as_deref(), Some("v"));
    }
}
