//! PostgreSQL notification store
//!
//! Implements both the write side ([`NotificationSink`]) and the inbox read
//! side ([`NotificationRepository`]) over the `notifications` table.

use std::sync::Arc;

use async_trait::async_trait;
use circle_core::{
    ChangeFeed, Clock, Notification, NotificationRepository, NotificationSink, RepoResult,
    Snowflake, StoreEvent,
};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::instrument;

use crate::models::NotificationModel;

use super::error::map_db_error;

#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool, feed: Arc<dyn ChangeFeed>, clock: Arc<dyn Clock>) -> Self {
        Self { pool, feed, clock }
    }
}

#[async_trait]
impl NotificationSink for PgNotificationStore {
    #[instrument(skip(self, notification), fields(user_id = %notification.user_id))]
    async fn notify(&self, notification: &Notification) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, title, body, kind, data, created_at, read)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(notification.id.into_inner())
        .bind(notification.user_id.into_inner())
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(notification.kind.as_str())
        .bind(Json(&notification.data))
        .bind(notification.created_at)
        .bind(notification.read)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        tracing::debug!(kind = notification.kind.as_str(), "Notification stored");
        self.feed
            .publish(StoreEvent::NotificationCreated {
                user_id: notification.user_id,
                notification_id: notification.id,
                at: self.clock.now(),
            })
            .await;
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationStore {
    #[instrument(skip(self))]
    async fn find_by_user(
        &self,
        user_id: Snowflake,
        unread_only: bool,
        limit: usize,
    ) -> RepoResult<Vec<Notification>> {
        sqlx::query_as::<_, NotificationModel>(
            r#"
            SELECT id, user_id, title, body, kind, data, created_at, read
            FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR NOT read)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(user_id.into_inner())
        .bind(unread_only)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?
        .into_iter()
        .map(Notification::try_from)
        .collect()
    }

    #[instrument(skip(self))]
    async fn mark_read(&self, user_id: Snowflake, id: Snowflake) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE id = $1 AND user_id = $2 AND NOT read",
        )
        .bind(id.into_inner())
        .bind(user_id.into_inner())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn unread_count(&self, user_id: Snowflake) -> RepoResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT read",
        )
        .bind(user_id.into_inner())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)
    }
}
