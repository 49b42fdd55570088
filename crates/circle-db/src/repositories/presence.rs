//! PostgreSQL presence records

use std::sync::Arc;

use async_trait::async_trait;
use circle_core::{ChangeFeed, Presence, PresenceRepository, RepoResult, Snowflake, StoreEvent};
use sqlx::PgPool;
use tracing::instrument;

use crate::models::PresenceModel;

use super::error::map_db_error;

#[derive(Clone)]
pub struct PgPresenceRepository {
    pool: PgPool,
    feed: Arc<dyn ChangeFeed>,
}

impl PgPresenceRepository {
    pub fn new(pool: PgPool, feed: Arc<dyn ChangeFeed>) -> Self {
        Self { pool, feed }
    }
}

#[async_trait]
impl PresenceRepository for PgPresenceRepository {
    #[instrument(skip(self))]
    async fn get(&self, user_id: Snowflake) -> RepoResult<Option<Presence>> {
        let row = sqlx::query_as::<_, PresenceModel>(
            "SELECT user_id, online, last_seen FROM presence WHERE user_id = $1",
        )
        .bind(user_id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(Presence::from))
    }

    #[instrument(skip(self, presence), fields(user_id = %presence.user_id))]
    async fn set(&self, presence: &Presence) -> RepoResult<()> {
        // The conditional upsert touches no row when nothing changed
        let changed = sqlx::query(
            r#"
            INSERT INTO presence (user_id, online, last_seen)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET online = EXCLUDED.online, last_seen = EXCLUDED.last_seen
            WHERE presence.online IS DISTINCT FROM EXCLUDED.online
               OR presence.last_seen IS DISTINCT FROM EXCLUDED.last_seen
            "#,
        )
        .bind(presence.user_id.into_inner())
        .bind(presence.online)
        .bind(presence.last_seen)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?
        .rows_affected()
            > 0;

        if changed {
            self.feed
                .publish(StoreEvent::PresenceChanged {
                    user_id: presence.user_id,
                    online: presence.online,
                    at: presence.last_seen,
                })
                .await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PgPresenceRepository>();
    }
}
