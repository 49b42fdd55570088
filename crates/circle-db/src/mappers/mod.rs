//! Entity to model mappers
//!
//! - `From<Model> for Entity` / `TryFrom` where a stored string must parse
//! - `*Values` structs: entity data flattened for binding

mod community;
mod conversation;
mod message;
mod notification;
mod user;

use chrono::{DateTime, Utc};
use circle_core::{DomainError, MessageKind, MessageSummary, Snowflake};

pub use community::{CommunityDocument, CommunityValues};
pub use conversation::unread_column;
pub use message::LinkPreviewValue;

/// A stored value that no longer parses into its domain type
pub(crate) fn corrupt(what: &str, value: &str) -> DomainError {
    DomainError::StoreFailure(format!("corrupt {what} in store: {value}"))
}

/// Flattened last-message columns shared by communities and conversations
#[derive(Debug, Clone, Default)]
pub struct SummaryValues<'a> {
    pub message_id: Option<i64>,
    pub sender_id: Option<i64>,
    pub preview: Option<&'a str>,
    pub kind: Option<&'static str>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl<'a> SummaryValues<'a> {
    pub fn new(summary: Option<&'a MessageSummary>) -> Self {
        summary.map_or_else(Self::default, |s| Self {
            message_id: Some(s.message_id.into_inner()),
            sender_id: Some(s.sender_id.into_inner()),
            preview: Some(&s.preview),
            kind: Some(s.kind.as_str()),
            sent_at: Some(s.sent_at),
        })
    }
}

/// Rebuild a summary; all columns must be present
pub(crate) fn summary_from_columns(
    message_id: Option<i64>,
    sender_id: Option<i64>,
    preview: Option<String>,
    kind: Option<String>,
    sent_at: Option<DateTime<Utc>>,
) -> Option<MessageSummary> {
    let (message_id, sender_id, preview, kind, sent_at) =
        (message_id?, sender_id?, preview?, kind?, sent_at?);
    Some(MessageSummary {
        message_id: Snowflake::new(message_id),
        sender_id: Snowflake::new(sender_id),
        preview,
        kind: MessageKind::parse(&kind).unwrap_or_default(),
        sent_at,
    })
}
