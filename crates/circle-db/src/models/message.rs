//! Message database model

use chrono::{DateTime, Utc};
use circle_core::LinkPreview;
use sqlx::types::Json;
use sqlx::FromRow;

pub const MESSAGE_COLUMNS: &str = "id, conversation_id, sequence, sender_id, sender_name, \
    recipient_id, community_id, content, attachments, kind, link_preview, status, is_read, \
    is_delivered, created_at";

/// Database model for messages table
#[derive(Debug, Clone, FromRow)]
pub struct MessageModel {
    pub id: i64,
    pub conversation_id: String,
    pub sequence: i64,
    pub sender_id: i64,
    pub sender_name: Option<String>,
    pub recipient_id: Option<i64>,
    pub community_id: Option<i64>,
    pub content: String,
    pub attachments: Vec<String>,
    pub kind: String,
    pub link_preview: Option<Json<LinkPreview>>,
    pub status: String,
    pub is_read: bool,
    pub is_delivered: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageModel {
    /// Check if message belongs to a direct conversation
    #[inline]
    pub fn is_direct(&self) -> bool {
        self.recipient_id.is_some()
    }
}
