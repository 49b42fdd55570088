//! PostgreSQL implementation of ConversationRepository

use std::sync::Arc;

use async_trait::async_trait;
use circle_core::{
    ChangeFeed, Clock, Conversation, ConversationId, ConversationRepository, DomainError,
    MessageSummary, RepoResult, Snowflake, StoreEvent,
};
use sqlx::PgPool;
use tracing::instrument;

use crate::mappers::{unread_column, SummaryValues};
use crate::models::{ConversationModel, CONVERSATION_COLUMNS};

use super::error::map_db_error;

/// PostgreSQL implementation of ConversationRepository
#[derive(Clone)]
pub struct PgConversationRepository {
    pool: PgPool,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool, feed: Arc<dyn ChangeFeed>, clock: Arc<dyn Clock>) -> Self {
        Self { pool, feed, clock }
    }

    async fn changed(&self, id: ConversationId) {
        self.feed
            .publish(StoreEvent::ConversationChanged {
                conversation_id: id,
                at: self.clock.now(),
            })
            .await;
    }
}

fn not_found(id: &ConversationId) -> DomainError {
    DomainError::ConversationNotFound(id.to_string())
}

fn counter(id: &ConversationId, user_id: Snowflake) -> RepoResult<&'static str> {
    unread_column(id, user_id).ok_or_else(|| {
        DomainError::NotAuthorized(format!("user {user_id} is not a participant of {id}"))
    })
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: &ConversationId) -> RepoResult<Option<Conversation>> {
        if !id.is_direct() {
            return Ok(None);
        }
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1");
        sqlx::query_as::<_, ConversationModel>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .map(Conversation::try_from)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_participant(&self, user_id: Snowflake) -> RepoResult<Vec<Conversation>> {
        let sql = format!(
            r#"
            SELECT {CONVERSATION_COLUMNS} FROM conversations
            WHERE low_id = $1 OR high_id = $1
            ORDER BY COALESCE(last_message_at, updated_at) DESC, id
            "#
        );
        sqlx::query_as::<_, ConversationModel>(&sql)
            .bind(user_id.into_inner())
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?
            .into_iter()
            .map(Conversation::try_from)
            .collect()
    }

    #[instrument(skip(self, conversation), fields(conversation_id = %conversation.id))]
    async fn create_if_absent(&self, conversation: &Conversation) -> RepoResult<Conversation> {
        let id = conversation.id;
        let (low, high) = id.participants().ok_or(DomainError::DirectConversationOnly)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO conversations (id, low_id, high_id, low_unread, high_unread, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id.to_string())
        .bind(low.into_inner())
        .bind(high.into_inner())
        .bind(conversation.unread_for(low))
        .bind(conversation.unread_for(high))
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?
        .rows_affected()
            > 0;

        if inserted {
            tracing::debug!(conversation_id = %id, "Conversation created");
            self.changed(id).await;
        }
        self.find_by_id(&id).await?.ok_or_else(|| not_found(&id))
    }

    #[instrument(skip(self))]
    async fn increment_unread(
        &self,
        id: &ConversationId,
        user_id: Snowflake,
        delta: i64,
    ) -> RepoResult<i64> {
        let column = counter(id, user_id)?;
        let sql = format!(
            "UPDATE conversations SET {column} = GREATEST({column} + $2, 0), updated_at = $3 \
             WHERE id = $1 RETURNING {column}"
        );
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(id.to_string())
            .bind(delta)
            .bind(self.clock.now())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| not_found(id))?;

        self.changed(*id).await;
        Ok(count)
    }

    #[instrument(skip(self))]
    async fn reset_unread(&self, id: &ConversationId, user_id: Snowflake) -> RepoResult<()> {
        let column = counter(id, user_id)?;
        let sql = format!(
            r#"
            WITH previous AS (
                SELECT id, {column} AS was FROM conversations WHERE id = $1 FOR UPDATE
            )
            UPDATE conversations c
            SET {column} = 0, updated_at = $2
            FROM previous
            WHERE c.id = previous.id
            RETURNING previous.was
            "#
        );
        let was = sqlx::query_scalar::<_, i64>(&sql)
            .bind(id.to_string())
            .bind(self.clock.now())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| not_found(id))?;

        if was != 0 {
            self.changed(*id).await;
        }
        Ok(())
    }

    #[instrument(skip(self, summary))]
    async fn set_last_message(
        &self,
        id: &ConversationId,
        summary: &MessageSummary,
    ) -> RepoResult<()> {
        let last = SummaryValues::new(Some(summary));
        let found = sqlx::query(
            r#"
            UPDATE conversations
            SET last_message_id = CASE WHEN newer THEN $2 ELSE last_message_id END,
                last_message_sender = CASE WHEN newer THEN $3 ELSE last_message_sender END,
                last_message_preview = CASE WHEN newer THEN $4 ELSE last_message_preview END,
                last_message_kind = CASE WHEN newer THEN $5 ELSE last_message_kind END,
                last_message_at = CASE WHEN newer THEN $6 ELSE last_message_at END,
                updated_at = $7
            FROM (
                SELECT last_message_at IS NULL OR last_message_at <= $6 AS newer
                FROM conversations WHERE id = $1
            ) AS cmp
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .bind(last.message_id)
        .bind(last.sender_id)
        .bind(last.preview)
        .bind(last.kind)
        .bind(last.sent_at)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?
        .rows_affected()
            > 0;

        if !found {
            return Err(not_found(id));
        }
        self.changed(*id).await;
        Ok(())
    }
}
