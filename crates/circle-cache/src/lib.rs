//! # circle-cache
//!
//! Redis layer for presence, notification push and cross-instance change
//! propagation.
//!
//! ## Features
//!
//! - **Connection Pool**: Managed Redis connection pool with deadpool
//! - **Presence**: A [`PresenceRepository`](circle_core::PresenceRepository) kept in Redis
//! - **Notification Push**: Per-user channels for delivered notifications
//! - **Change Feed Relay**: A [`ChangeFeed`](circle_core::ChangeFeed) whose events reach
//!   subscribers on every engine instance
//!
//! ## Example
//!
//! ```ignore
//! use circle_cache::{RedisChangeFeed, RedisPool, RedisPoolConfig, RelayConfig};
//!
//! let pool = RedisPool::new(RedisPoolConfig::default())?;
//! let feed = RedisChangeFeed::start(pool.clone(), RelayConfig::default());
//!
//! // Repositories publish through the relay; subscriptions watch it.
//! let store = circle_db::PgStore::new(pg_pool, feed.clone(), clock);
//! let presence = RedisPresenceRepository::new(pool, feed);
//! ```

pub mod notification;
pub mod pool;
pub mod presence;
pub mod pubsub;

// Re-export pool types
pub use pool::{
    create_shared_pool, RedisPool, RedisPoolConfig, RedisPoolError, RedisResult, SharedRedisPool,
};

// Re-export presence types
pub use presence::{presence_key, RedisPresenceRepository, PRESENCE_PREFIX};

// Re-export notification types
pub use notification::RedisNotificationSink;

// Re-export pubsub types
pub use pubsub::{
    PubSubChannel, PubSubEvent, Publisher, RedisChangeFeed, RelayConfig, FEED_CHANNEL_PATTERN,
    FEED_CHANNEL_PREFIX, NOTIFICATION_EVENT, NOTIFY_CHANNEL_PREFIX,
};
