//! PostgreSQL implementation of MessageRepository
//!
//! Sequences come from the `message_sequences` row of the conversation,
//! bumped in the same transaction as the insert. The row lock taken by the
//! upsert orders concurrent senders, and `created_at` never moves backwards
//! within a conversation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use circle_core::{
    ChangeFeed, Clock, ConversationId, DomainError, Message, MessageQuery, MessageRepository,
    MessageStatus, RepoResult, Snowflake, StoreEvent,
};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::instrument;

use crate::mappers::LinkPreviewValue;
use crate::models::{MessageModel, MESSAGE_COLUMNS};

use super::error::{map_db_error, map_unique_violation};

/// PostgreSQL implementation of MessageRepository
#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool, feed: Arc<dyn ChangeFeed>, clock: Arc<dyn Clock>) -> Self {
        Self { pool, feed, clock }
    }

    async fn written(&self, conversation_id: ConversationId, message_id: Option<Snowflake>) {
        self.feed
            .publish(StoreEvent::MessageWritten {
                conversation_id,
                message_id,
                at: self.clock.now(),
            })
            .await;
    }
}

fn to_messages(rows: Vec<MessageModel>) -> RepoResult<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

fn limit(query: &MessageQuery) -> i64 {
    i64::try_from(query.limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    #[instrument(skip(self, message), fields(message_id = %message.id))]
    async fn create(&self, mut message: Message) -> RepoResult<Message> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let (sequence, created_at) = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            r#"
            INSERT INTO message_sequences (conversation_id, last_sequence, last_created_at)
            VALUES ($1, 1, $2)
            ON CONFLICT (conversation_id) DO UPDATE
            SET last_sequence = message_sequences.last_sequence + 1,
                last_created_at = GREATEST(message_sequences.last_created_at, EXCLUDED.last_created_at)
            RETURNING last_sequence, last_created_at
            "#,
        )
        .bind(message.conversation_id.to_string())
        .bind(self.clock.now())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;

        message.sequence = sequence;
        message.created_at = created_at;
        let preview: LinkPreviewValue<'_> = message.link_preview.as_ref().map(Json);

        sqlx::query(
            r#"
            INSERT INTO messages (
                id, conversation_id, sequence, sender_id, sender_name, recipient_id,
                community_id, content, attachments, kind, link_preview, status, is_read,
                is_delivered, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(message.id.into_inner())
        .bind(message.conversation_id.to_string())
        .bind(message.sequence)
        .bind(message.sender_id.into_inner())
        .bind(message.sender_name.as_deref())
        .bind(message.recipient_id().map(Snowflake::into_inner))
        .bind(message.community_id().map(Snowflake::into_inner))
        .bind(&message.content)
        .bind(&message.attachments)
        .bind(message.kind.as_str())
        .bind(preview)
        .bind(message.status.as_str())
        .bind(message.is_read)
        .bind(message.is_delivered)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            map_unique_violation(e, || {
                DomainError::StoreFailure(format!("message {} already exists", message.id))
            })
        })?;

        tx.commit().await.map_err(map_db_error)?;

        tracing::trace!(
            message_id = %message.id,
            conversation_id = %message.conversation_id,
            sequence = message.sequence,
            "Message stored"
        );
        self.written(message.conversation_id, Some(message.id)).await;
        Ok(message)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Snowflake) -> RepoResult<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        sqlx::query_as::<_, MessageModel>(&sql)
            .bind(id.into_inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .map(Message::try_from)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_conversation(
        &self,
        conversation_id: &ConversationId,
        query: MessageQuery,
    ) -> RepoResult<Vec<Message>> {
        // Newest page first, then flipped back to ascending order
        let sql = format!(
            r#"
            SELECT * FROM (
                SELECT {MESSAGE_COLUMNS} FROM messages
                WHERE conversation_id = $1 AND ($2::BIGINT IS NULL OR sequence < $2)
                ORDER BY created_at DESC, sequence DESC
                LIMIT $3
            ) AS page
            ORDER BY created_at, sequence
            "#
        );
        let rows = sqlx::query_as::<_, MessageModel>(&sql)
            .bind(conversation_id.to_string())
            .bind(query.before_sequence)
            .bind(limit(&query))
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        to_messages(rows)
    }

    #[instrument(skip(self))]
    async fn find_between(
        &self,
        a: Snowflake,
        b: Snowflake,
        query: MessageQuery,
    ) -> RepoResult<Vec<Message>> {
        let sql = format!(
            r#"
            SELECT * FROM (
                SELECT {MESSAGE_COLUMNS} FROM messages
                WHERE ((sender_id = $1 AND recipient_id = $2)
                    OR (sender_id = $2 AND recipient_id = $1))
                  AND ($3::BIGINT IS NULL OR sequence < $3)
                ORDER BY created_at DESC, sequence DESC
                LIMIT $4
            ) AS page
            ORDER BY created_at, sequence
            "#
        );
        let rows = sqlx::query_as::<_, MessageModel>(&sql)
            .bind(a.into_inner())
            .bind(b.into_inner())
            .bind(query.before_sequence)
            .bind(limit(&query))
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        to_messages(rows)
    }

    #[instrument(skip(self))]
    async fn mark_delivered(
        &self,
        conversation_id: &ConversationId,
        recipient_id: Snowflake,
    ) -> RepoResult<u64> {
        let changed = sqlx::query(
            r#"
            UPDATE messages
            SET status = 'DELIVERED', is_delivered = TRUE
            WHERE conversation_id = $1 AND recipient_id = $2
              AND NOT is_delivered AND status = 'SENT'
            "#,
        )
        .bind(conversation_id.to_string())
        .bind(recipient_id.into_inner())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?
        .rows_affected();

        if changed > 0 {
            self.written(*conversation_id, None).await;
        }
        Ok(changed)
    }

    #[instrument(skip(self))]
    async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        recipient_id: Snowflake,
    ) -> RepoResult<u64> {
        let changed = sqlx::query(
            r#"
            UPDATE messages
            SET status = 'READ', is_read = TRUE, is_delivered = TRUE
            WHERE conversation_id = $1 AND recipient_id = $2
              AND NOT is_read AND status IN ('SENT', 'DELIVERED')
            "#,
        )
        .bind(conversation_id.to_string())
        .bind(recipient_id.into_inner())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?
        .rows_affected();

        if changed > 0 {
            self.written(*conversation_id, None).await;
        }
        Ok(changed)
    }

    #[instrument(skip(self))]
    async fn mark_failed(&self, id: Snowflake) -> RepoResult<Message> {
        let sql = format!(
            "UPDATE messages SET status = 'FAILED' WHERE id = $1 AND status = 'SENT' \
             RETURNING {MESSAGE_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, MessageModel>(&sql)
            .bind(id.into_inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        let Some(row) = updated else {
            // Either missing or past SENT; report which
            let current = self.find_by_id(id).await?.ok_or(DomainError::MessageNotFound(id))?;
            return Err(DomainError::InvalidStatusTransition {
                from: current.status,
                to: MessageStatus::Failed,
            });
        };

        let message = Message::try_from(row)?;
        self.written(message.conversation_id, Some(id)).await;
        Ok(message)
    }

    #[instrument(skip(self))]
    async fn last_sent_by(
        &self,
        conversation_id: &ConversationId,
        sender_id: Snowflake,
    ) -> RepoResult<Option<Message>> {
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE conversation_id = $1 AND sender_id = $2
            ORDER BY sequence DESC
            LIMIT 1
            "#
        );
        sqlx::query_as::<_, MessageModel>(&sql)
            .bind(conversation_id.to_string())
            .bind(sender_id.into_inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .map(Message::try_from)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn delete_before(
        &self,
        conversation_id: &ConversationId,
        cutoff: DateTime<Utc>,
    ) -> RepoResult<u64> {
        let removed = sqlx::query("DELETE FROM messages WHERE conversation_id = $1 AND created_at < $2")
            .bind(conversation_id.to_string())
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?
            .rows_affected();

        if removed > 0 {
            self.written(*conversation_id, None).await;
        }
        Ok(removed)
    }
}
