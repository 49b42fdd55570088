//! In-memory message repository
//!
//! Messages are kept per conversation in insertion order. The timeline's
//! write guard serializes inserts, so the sequence counter and the creation
//! timestamp assigned under it are monotonic within a conversation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use circle_core::{
    ChangeFeed, Clock, ConversationId, DomainError, Message, MessageQuery, MessageRepository,
    MessageStatus, RepoResult, Snowflake, StoreEvent,
};
use dashmap::DashMap;

#[derive(Default)]
struct Timeline {
    next_sequence: i64,
    messages: Vec<Message>,
}

pub struct MemoryMessageRepository {
    timelines: DashMap<ConversationId, Timeline>,
    index: DashMap<Snowflake, ConversationId>,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
}

impl MemoryMessageRepository {
    pub fn new(feed: Arc<dyn ChangeFeed>, clock: Arc<dyn Clock>) -> Self {
        Self {
            timelines: DashMap::new(),
            index: DashMap::new(),
            feed,
            clock,
        }
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

    /// Apply `advance` to every message addressed to `recipient_id` that
    /// `pending` selects; returns how many changed
    fn advance_all(
        &self,
        conversation_id: &ConversationId,
        recipient_id: Snowflake,
        pending: impl Fn(&Message) -> bool,
        target: MessageStatus,
    ) -> u64 {
        let Some(mut timeline) = self.timelines.get_mut(conversation_id) else {
            return 0;
        };
        let mut changed = 0;
        for message in timeline
            .messages
            .iter_mut()
            .filter(|m| m.is_addressed_to(recipient_id) && pending(m))
        {
            if message.advance_to(target) {
                changed += 1;
            }
        }
        changed
    }
}

fn newest(messages: impl Iterator<Item = Message>, query: MessageQuery) -> Vec<Message> {
    let mut selected: Vec<Message> = messages
        .filter(|m| query.before_sequence.is_none_or(|before| m.sequence < before))
        .collect();
    selected.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then(a.sequence.cmp(&b.sequence))
    });
    let skip = selected.len().saturating_sub(query.limit);
    selected.split_off(skip)
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn create(&self, mut message: Message) -> RepoResult<Message> {
        if self.index.contains_key(&message.id) {
            return Err(DomainError::StoreFailure(format!(
                "message {} already exists",
                message.id
            )));
        }

        let stored = {
            let mut timeline = self.timelines.entry(message.conversation_id).or_default();
            timeline.next_sequence += 1;
            let floor = timeline
                .messages
                .last()
                .map_or(DateTime::<Utc>::MIN_UTC, |last| last.created_at);

            message.sequence = timeline.next_sequence;
            message.created_at = self.clock.now().max(floor);
            timeline.messages.push(message.clone());
            message
        };
        self.index.insert(stored.id, stored.conversation_id);

        tracing::trace!(
            message_id = %stored.id,
            conversation_id = %stored.conversation_id,
            sequence = stored.sequence,
            "Message stored"
        );
        self.written(stored.conversation_id, Some(stored.id)).await;
        Ok(stored)
    }

    async fn find_by_id(&self, id: Snowflake) -> RepoResult<Option<Message>> {
        let Some(conversation_id) = self.index.get(&id).map(|c| *c) else {
            return Ok(None);
        };
        Ok(self.timelines.get(&conversation_id).and_then(|timeline| {
            timeline.messages.iter().find(|m| m.id == id).cloned()
        }))
    }

    async fn find_by_conversation(
        &self,
        conversation_id: &ConversationId,
        query: MessageQuery,
    ) -> RepoResult<Vec<Message>> {
        Ok(self
            .timelines
            .get(conversation_id)
            .map(|timeline| newest(timeline.messages.iter().cloned(), query))
            .unwrap_or_default())
    }

    async fn find_between(
        &self,
        a: Snowflake,
        b: Snowflake,
        query: MessageQuery,
    ) -> RepoResult<Vec<Message>> {
        let between = |m: &Message| {
            m.recipient_id().is_some_and(|recipient| {
                (m.sender_id == a && recipient == b) || (m.sender_id == b && recipient == a)
            })
        };
        let matching: Vec<Message> = self
            .timelines
            .iter()
            .filter(|entry| entry.key().is_direct())
            .flat_map(|entry| {
                entry
                    .messages
                    .iter()
                    .filter(|m| between(m))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        Ok(newest(matching.into_iter(), query))
    }

    async fn mark_delivered(
        &self,
        conversation_id: &ConversationId,
        recipient_id: Snowflake,
    ) -> RepoResult<u64> {
        let changed = self.advance_all(
            conversation_id,
            recipient_id,
            |m| !m.is_delivered,
            MessageStatus::Delivered,
        );
        if changed > 0 {
            self.written(*conversation_id, None).await;
        }
        Ok(changed)
    }

    async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        recipient_id: Snowflake,
    ) -> RepoResult<u64> {
        let changed = self.advance_all(
            conversation_id,
            recipient_id,
            |m| !m.is_read,
            MessageStatus::Read,
        );
        if changed > 0 {
            self.written(*conversation_id, None).await;
        }
        Ok(changed)
    }

    async fn mark_failed(&self, id: Snowflake) -> RepoResult<Message> {
        let conversation_id = self
            .index
            .get(&id)
            .map(|c| *c)
            .ok_or(DomainError::MessageNotFound(id))?;

        let updated = {
            let mut timeline = self
                .timelines
                .get_mut(&conversation_id)
                .ok_or(DomainError::MessageNotFound(id))?;
            let message = timeline
                .messages
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or(DomainError::MessageNotFound(id))?;
            let from = message.status;
            if !message.advance_to(MessageStatus::Failed) {
                return Err(DomainError::InvalidStatusTransition {
                    from,
                    to: MessageStatus::Failed,
                });
            }
            message.clone()
        };
        self.written(conversation_id, Some(id)).await;
        Ok(updated)
    }

    async fn last_sent_by(
        &self,
        conversation_id: &ConversationId,
        sender_id: Snowflake,
    ) -> RepoResult<Option<Message>> {
        Ok(self.timelines.get(conversation_id).and_then(|timeline| {
            timeline
                .messages
                .iter()
                .rev()
                .find(|m| m.sender_id == sender_id)
                .cloned()
        }))
    }

    async fn delete_before(
        &self,
        conversation_id: &ConversationId,
        cutoff: DateTime<Utc>,
    ) -> RepoResult<u64> {
        let removed: Vec<Snowflake> = match self.timelines.get_mut(conversation_id) {
            Some(mut timeline) => {
                let (expired, kept): (Vec<Message>, Vec<Message>) = timeline
                    .messages
                    .drain(..)
                    .partition(|m| m.created_at < cutoff);
                timeline.messages = kept;
                expired.into_iter().map(|m| m.id).collect()
            }
            None => Vec::new(),
        };
        for id in &removed {
            self.index.remove(id);
        }
        if !removed.is_empty() {
            self.written(*conversation_id, None).await;
        }
        Ok(removed.len() as u64)
    }
}
