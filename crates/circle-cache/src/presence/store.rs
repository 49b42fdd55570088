//! User presence storage in Redis.

use std::sync::Arc;

use async_trait::async_trait;
use circle_core::{ChangeFeed, Presence, PresenceRepository, RepoResult, Snowflake, StoreEvent};

use crate::pool::RedisPool;

/// Key prefix for user presence
pub const PRESENCE_PREFIX: &str = "circle:presence:";

#[must_use]
pub fn presence_key(user_id: Snowflake) -> String {
    format!("{PRESENCE_PREFIX}{user_id}")
}

/// Redis-backed presence repository.
///
/// Writes swap the stored record atomically so only an actual change
/// reaches the feed.
pub struct RedisPresenceRepository {
    pool: RedisPool,
    feed: Arc<dyn ChangeFeed>,
}

impl RedisPresenceRepository {
    pub fn new(pool: RedisPool, feed: Arc<dyn ChangeFeed>) -> Self {
        Self { pool, feed }
    }

    /// Drop a user's presence record entirely
    pub async fn clear(&self, user_id: Snowflake) -> RepoResult<bool> {
        Ok(self.pool.delete(&presence_key(user_id)).await?)
    }
}

/// Whether the stored JSON describes a different presence than `next`
fn is_change(previous: Option<&str>, next: &Presence) -> bool {
    match previous.map(serde_json::from_str::<Presence>) {
        Some(Ok(previous)) => previous != *next,
        Some(Err(e)) => {
            tracing::warn!(error = %e, user_id = %next.user_id, "Replacing unreadable presence record");
            true
        }
        None => true,
    }
}

#[async_trait]
impl PresenceRepository for RedisPresenceRepository {
    async fn get(&self, user_id: Snowflake) -> RepoResult<Option<Presence>> {
        Ok(self.pool.get_value(&presence_key(user_id)).await?)
    }

    async fn set(&self, presence: &Presence) -> RepoResult<()> {
        let previous = self.pool.swap(&presence_key(presence.user_id), presence).await?;
        if !is_change(previous.as_deref(), presence) {
            return Ok(());
        }

        tracing::debug!(user_id = %presence.user_id, online = presence.online, "Presence updated");
        self.feed
            .publish(StoreEvent::PresenceChanged {
                user_id: presence.user_id,
                online: presence.online,
                at: presence.last_seen,
            })
            .await;
        Ok(())
    }
}
