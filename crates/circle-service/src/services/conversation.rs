//! Conversation directory
//!
//! Resolves the canonical direct conversation for a pair of users and keeps
//! per-participant unread counters.

use circle_core::{Conversation, ConversationId, DomainError, Snowflake};
use tracing::{debug, info, instrument};

use super::context::ServiceContext;
use super::error::ServiceResult;

/// Conversation directory
pub struct ConversationDirectory<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> ConversationDirectory<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Same conversation whichever participant asks; created on first use
    #[instrument(skip(self))]
    pub async fn resolve_direct(&self, a: Snowflake, b: Snowflake) -> ServiceResult<Conversation> {
        let id = ConversationId::direct(a, b).ok_or(DomainError::SelfConversation)?;
        if let Some(existing) = self.ctx.store(self.ctx.conversation_repo().find_by_id(&id)).await? {
            return Ok(existing);
        }

        let fresh = Conversation::direct(id, self.ctx.now()).ok_or(DomainError::DirectConversationOnly)?;
        let stored = self
            .ctx
            .store(self.ctx.conversation_repo().create_if_absent(&fresh))
            .await?;
        debug!(conversation_id = %id, "Direct conversation resolved");
        Ok(stored)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, conversation_id: &ConversationId, viewer_id: Snowflake) -> ServiceResult<Conversation> {
        ensure_participant(conversation_id, viewer_id)?;
        let conversation = self
            .ctx
            .store(self.ctx.conversation_repo().find_by_id(conversation_id))
            .await?
            .ok_or_else(|| DomainError::ConversationNotFound(conversation_id.to_string()))?;
        Ok(conversation)
    }

    /// Zeroes the caller's counter and flips read on messages addressed to them.
    /// Returns how many messages changed.
    #[instrument(skip(self))]
    pub async fn mark_read(&self, conversation_id: &ConversationId, user_id: Snowflake) -> ServiceResult<u64> {
        ensure_participant(conversation_id, user_id)?;
        self.ctx
            .store(self.ctx.conversation_repo().reset_unread(conversation_id, user_id))
            .await?;
        let changed = self
            .ctx
            .store(self.ctx.message_repo().mark_read(conversation_id, user_id))
            .await?;
        info!(conversation_id = %conversation_id, user_id = %user_id, changed, "Conversation read");
        Ok(changed)
    }

    /// Flips delivered on messages addressed to the caller; read state is untouched
    #[instrument(skip(self))]
    pub async fn mark_delivered(
        &self,
        conversation_id: &ConversationId,
        user_id: Snowflake,
    ) -> ServiceResult<u64> {
        ensure_participant(conversation_id, user_id)?;
        let changed = self
            .ctx
            .store(self.ctx.message_repo().mark_delivered(conversation_id, user_id))
            .await?;
        debug!(conversation_id = %conversation_id, user_id = %user_id, changed, "Messages delivered");
        Ok(changed)
    }

    #[instrument(skip(self))]
    pub async fn increment_unread(
        &self,
        conversation_id: &ConversationId,
        user_id: Snowflake,
    ) -> ServiceResult<i64> {
        ensure_participant(conversation_id, user_id)?;
        self.ctx
            .store(self.ctx.conversation_repo().increment_unread(conversation_id, user_id, 1))
            .await
    }

    /// Most recent activity first
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: Snowflake) -> ServiceResult<Vec<Conversation>> {
        self.ctx
            .store(self.ctx.conversation_repo().find_by_participant(user_id))
            .await
    }

    #[instrument(skip(self))]
    pub async fn total_unread(&self, user_id: Snowflake) -> ServiceResult<i64> {
        let conversations = self.list_for_user(user_id).await?;
        Ok(conversations.iter().map(|c| c.unread_for(user_id)).sum())
    }
}

pub(crate) fn ensure_participant(id: &ConversationId, user_id: Snowflake) -> Result<(), DomainError> {
    if !id.is_direct() {
        return Err(DomainError::DirectConversationOnly);
    }
    if !id.includes(user_id) {
        return Err(DomainError::NotAuthorized(format!(
            "user {user_id} is not a participant of {id}"
        )));
    }
    Ok(())
}
