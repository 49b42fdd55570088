//! In-memory conversation repository

use std::sync::Arc;

use async_trait::async_trait;
use circle_core::{
    ChangeFeed, Clock, Conversation, ConversationId, ConversationRepository, DomainError,
    MessageSummary, RepoResult, Snowflake, StoreEvent,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

pub struct MemoryConversationRepository {
    conversations: DashMap<ConversationId, Conversation>,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
}

impl MemoryConversationRepository {
    pub fn new(feed: Arc<dyn ChangeFeed>, clock: Arc<dyn Clock>) -> Self {
        Self {
            conversations: DashMap::new(),
            feed,
            clock,
        }
    }

    fn mutate<T>(
        &self,
        id: &ConversationId,
        f: impl FnOnce(&mut Conversation) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let mut entry = self
            .conversations
            .get_mut(id)
            .ok_or_else(|| DomainError::ConversationNotFound(id.to_string()))?;
        let out = f(&mut entry)?;
        entry.updated_at = self.clock.now();
        Ok(out)
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

fn ensure_participant(id: &ConversationId, user_id: Snowflake) -> RepoResult<()> {
    if id.includes(user_id) {
        Ok(())
    } else {
        Err(DomainError::NotAuthorized(format!(
            "user {user_id} is not a participant of {id}"
        )))
    }
}

#[async_trait]
impl ConversationRepository for MemoryConversationRepository {
    async fn find_by_id(&self, id: &ConversationId) -> RepoResult<Option<Conversation>> {
        Ok(self.conversations.get(id).map(|c| c.clone()))
    }

    async fn find_by_participant(&self, user_id: Snowflake) -> RepoResult<Vec<Conversation>> {
        let mut found: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|c| c.id.includes(user_id))
            .map(|c| c.clone())
            .collect();
        found.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
        Ok(found)
    }

    async fn create_if_absent(&self, conversation: &Conversation) -> RepoResult<Conversation> {
        let (stored, inserted) = match self.conversations.entry(conversation.id) {
            Entry::Occupied(existing) => (existing.get().clone(), false),
            Entry::Vacant(slot) => (slot.insert(conversation.clone()).clone(), true),
        };
        if inserted {
            tracing::debug!(conversation_id = %conversation.id, "Conversation created");
            self.changed(conversation.id).await;
        }
        Ok(stored)
    }

    async fn increment_unread(
        &self,
        id: &ConversationId,
        user_id: Snowflake,
        delta: i64,
    ) -> RepoResult<i64> {
        ensure_participant(id, user_id)?;
        let count = self.mutate(id, |c| {
            let counter = c.unread.entry(user_id).or_insert(0);
            *counter = (*counter + delta).max(0);
            Ok(*counter)
        })?;
        self.changed(*id).await;
        Ok(count)
    }

    async fn reset_unread(&self, id: &ConversationId, user_id: Snowflake) -> RepoResult<()> {
        ensure_participant(id, user_id)?;
        let was = self.mutate(id, |c| Ok(c.unread.insert(user_id, 0).unwrap_or(0)))?;
        if was != 0 {
            self.changed(*id).await;
        }
        Ok(())
    }

    async fn set_last_message(
        &self,
        id: &ConversationId,
        summary: &MessageSummary,
    ) -> RepoResult<()> {
        self.mutate(id, |c| {
            if c
                .last_message
                .as_ref()
                .is_none_or(|current| current.sent_at <= summary.sent_at)
            {
                c.last_message = Some(summary.clone());
            }
            Ok(())
        })?;
        self.changed(*id).await;
        Ok(())
    }
}
