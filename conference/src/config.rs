//! Configuration management for the conference services.
//!
//! Loads configuration from environment variables with sensible defaults.

use conference_runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Redis configuration (cache and task queue)
    pub redis: RedisConfig,
    /// Derived cache configuration
    pub cache: CacheConfig,
    /// Seat transaction retry configuration
    pub transaction: TransactionConfig,
    /// Trigger queue configuration
    pub queue: QueueConfig,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Prefix for every key written by this service
    pub key_prefix: String,
}

/// Derived cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache name of the nearly-sold-out announcement
    pub announcement_key: String,
    /// Cache name of the featured speaker message
    pub featured_speaker_key: String,
    /// A conference is nearly sold out when `0 < seats_available <= threshold`
    pub nearly_sold_out_threshold: i64,
    /// Period of the announcement refresh in seconds
    pub announcement_refresh_secs: u64,
}

/// Seat transaction retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Retries after the first attempt
    pub max_retries: usize,
    /// First backoff delay in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub max_delay_ms: u64,
    /// Randomised share of each delay (0.0..=1.0)
    pub jitter: f64,
}

/// Trigger queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue carrying recomputation and notification triggers
    pub trigger_queue: String,
    /// Worker resubscribe delay in milliseconds
    pub worker_retry_delay_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "conference:".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            announcement_key: "RECENT_ANNOUNCEMENTS".to_string(),
            featured_speaker_key: "FEATURED SPEAKERS".to_string(),
            nearly_sold_out_threshold: 5,
            announcement_refresh_secs: 3600,
        }
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 10,
            max_delay_ms: 500,
            jitter: 0.5,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            trigger_queue: "conference-triggers".to_string(),
            worker_retry_delay_ms: 5000,
        }
    }
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or(defaults.redis.url),
                key_prefix: env::var("REDIS_KEY_PREFIX").unwrap_or(defaults.redis.key_prefix),
            },
            cache: CacheConfig {
                announcement_key: env::var("ANNOUNCEMENT_CACHE_KEY")
                    .unwrap_or(defaults.cache.announcement_key),
                featured_speaker_key: env::var("FEATURED_SPEAKER_CACHE_KEY")
                    .unwrap_or(defaults.cache.featured_speaker_key),
                nearly_sold_out_threshold: parsed("NEARLY_SOLD_OUT_THRESHOLD")
                    .unwrap_or(defaults.cache.nearly_sold_out_threshold),
                announcement_refresh_secs: parsed("ANNOUNCEMENT_REFRESH_SECS")
                    .unwrap_or(defaults.cache.announcement_refresh_secs),
            },
            transaction: TransactionConfig {
                max_retries: parsed("TRANSACTION_MAX_RETRIES")
                    .unwrap_or(defaults.transaction.max_retries),
                initial_delay_ms: parsed("TRANSACTION_INITIAL_DELAY_MS")
                    .unwrap_or(defaults.transaction.initial_delay_ms),
                max_delay_ms: parsed("TRANSACTION_MAX_DELAY_MS")
                    .unwrap_or(defaults.transaction.max_delay_ms),
                jitter: parsed("TRANSACTION_RETRY_JITTER").unwrap_or(defaults.transaction.jitter),
            },
            queue: QueueConfig {
                trigger_queue: env::var("TRIGGER_QUEUE").unwrap_or(defaults.queue.trigger_queue),
                worker_retry_delay_ms: parsed("WORKER_RETRY_DELAY_MS")
                    .unwrap_or(defaults.queue.worker_retry_delay_ms),
            },
        }
    }
}

impl TransactionConfig {
    /// Backoff policy for conflicted transactions.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.max_retries)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .jitter(self.jitter)
            .build()
    }
}

impl CacheConfig {
    /// Announcement refresh period.
    #[must_use]
    pub const fn announcement_refresh(&self) -> Duration {
        Duration::from_secs(self.announcement_refresh_secs)
    }
}

impl QueueConfig {
    /// Worker resubscribe delay.
    #[must_use]
    pub const fn worker_retry_delay(&self) -> Duration {
        Duration::from_millis(self.worker_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_cache_names_clients_read() {
        let config = Config::default();

        assert_eq!(config.cache.announcement_key, "RECENT_ANNOUNCEMENTS");
        assert_eq!(config.cache.featured_speaker_key, "FEATURED SPEAKERS");
        assert_eq!(config.cache.nearly_sold_out_threshold, 5);
        assert_eq!(config.queue.trigger_queue, "conference-triggers");
    }

    #[test]
    fn retry_policy_reflects_transaction_settings() {
        let policy = TransactionConfig {
            max_retries: 2,
            initial_delay_ms: 7,
            max_delay_ms: 9,
            jitter: 0.0,
        }
        .retry_policy();

        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(7));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(9));
    }
}
