//! Redis-backed [`Cache`].
//!
//! Entries are plain Redis strings under `{prefix}{name}`, without TTL: the
//! derived-cache manager owns their lifecycle and deletes them explicitly.

use conference_core::cache::{Cache, CacheError, CacheFuture};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

/// Redis cache with connection pooling via `ConnectionManager`.
#[derive(Clone)]
pub struct RedisCache {
    conn_manager: ConnectionManager,
    key_prefix: String,
}

impl RedisCache {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    /// * `key_prefix` - Namespace prepended to every cache name
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if connection to Redis fails.
    pub async fn new(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Unavailable(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self {
            conn_manager,
            key_prefix: key_prefix.into(),
        })
    }

    fn redis_key(&self, name: &str) -> String {
        cache_key(&self.key_prefix, name)
    }
}

pub(crate) fn cache_key(prefix: &str, name: &str) -> String {
    format!("{prefix}{name}")
}

fn backend_error(op: &str, e: &redis::RedisError) -> CacheError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
        CacheError::Unavailable(format!("Redis {op} failed: {e}"))
    } else {
        CacheError::Backend(format!("Redis {op} failed: {e}"))
    }
}

impl Cache for RedisCache {
    fn get<'a>(&'a self, name: &'a str) -> CacheFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let value: Option<String> = conn
                .get(self.redis_key(name))
                .await
                .map_err(|e| backend_error("GET", &e))?;
            Ok(value)
        })
    }

    fn set<'a>(&'a self, name: &'a str, value: String) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .set(self.redis_key(name), value)
                .await
                .map_err(|e| backend_error("SET", &e))?;
            tracing::debug!(name, "Cache entry written");
            Ok(())
        })
    }

    fn delete<'a>(&'a self, name: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .del(self.redis_key(name))
                .await
                .map_err(|e| backend_error("DEL", &e))?;
            tracing::debug!(name, "Cache entry deleted");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_namespaced_verbatim() {
        assert_eq!(cache_key("conf:", "FEATURED SPEAKERS"), "conf:FEATURED SPEAKERS");
        assert_eq!(cache_key("", "RECENT_ANNOUNCEMENTS"), "RECENT_ANNOUNCEMENTS");
    }
}
