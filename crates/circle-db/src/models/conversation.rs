//! Conversation database model

use chrono::{DateTime, Utc};
use sqlx::FromRow;

pub const CONVERSATION_COLUMNS: &str = "id, low_id, high_id, low_unread, high_unread, \
    last_message_id, last_message_sender, last_message_preview, last_message_kind, \
    last_message_at, created_at, updated_at";

/// Database model for conversations table (direct conversations only)
#[derive(Debug, Clone, FromRow)]
pub struct ConversationModel {
    pub id: String,
    pub low_id: i64,
    pub high_id: i64,
    pub low_unread: i64,
    pub high_unread: i64,
    pub last_message_id: Option<i64>,
    pub last_message_sender: Option<i64>,
    pub last_message_preview: Option<String>,
    pub last_message_kind: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
