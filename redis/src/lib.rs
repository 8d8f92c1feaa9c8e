//! # Conference Redis
//!
//! Production backends for the [`conference_core::cache::Cache`] and
//! [`conference_core::task_queue::TaskQueue`] traits.
//!
//! # Example
//!
//! ```no_run
//! use conference_redis::{RedisCache, RedisTaskQueue};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = RedisCache::new("redis://127.0.0.1:6379", "conference:").await?;
//! let queue = RedisTaskQueue::new("redis://127.0.0.1:6379", "conference:").await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod task_queue;

pub use cache::RedisCache;
pub use task_queue::RedisTaskQueue;
