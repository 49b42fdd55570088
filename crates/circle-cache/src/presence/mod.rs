//! Presence storage module.
//!
//! Keeps each user's online flag and last-seen time in Redis.

mod store;

pub use store::{presence_key, RedisPresenceRepository, PRESENCE_PREFIX};
