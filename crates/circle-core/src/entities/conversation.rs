//! Direct conversation between two users, plus the last-message summary
//! shared with communities

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::{Message, MessageKind};
use crate::value_objects::{ConversationId, Snowflake};

const PREVIEW_CHARS: usize = 120;

/// Denormalized view of the newest message in a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    pub message_id: Snowflake,
    pub sender_id: Snowflake,
    pub preview: String,
    pub kind: MessageKind,
    pub sent_at: DateTime<Utc>,
}

impl From<&Message> for MessageSummary {
    fn from(message: &Message) -> Self {
        let preview = if message.content.trim().is_empty() && !message.attachments.is_empty() {
            format!("[{} attachment(s)]", message.attachments.len())
        } else {
            message.content.chars().take(PREVIEW_CHARS).collect()
        };
        Self {
            message_id: message.id,
            sender_id: message.sender_id,
            preview,
            kind: message.kind,
            sent_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub unread: BTreeMap<Snowflake, i64>,
    pub last_message: Option<MessageSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Both unread counters start at zero.
    ///
    /// Returns `None` for a community id: only direct conversations
    /// have their own document.
    pub fn direct(id: ConversationId, now: DateTime<Utc>) -> Option<Self> {
        let (low, high) = id.participants()?;
        Some(Self {
            id,
            unread: BTreeMap::from([(low, 0), (high, 0)]),
            last_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn participants(&self) -> Option<(Snowflake, Snowflake)> {
        self.id.participants()
    }

    pub fn unread_for(&self, user_id: Snowflake) -> i64 {
        self.unread.get(&user_id).copied().unwrap_or(0)
    }

    /// Sort key for inbox listings: newest activity first
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map_or(self.updated_at, |summary| summary.sent_at)
    }
}
