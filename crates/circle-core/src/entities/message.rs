//! Message entity - one post in a direct or community conversation

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::{ConversationId, Snowflake};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    Link,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
            Self::File => "FILE",
            Self::Link => "LINK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TEXT" => Some(Self::Text),
            "IMAGE" => Some(Self::Image),
            "FILE" => Some(Self::File),
            "LINK" => Some(Self::Link),
            _ => None,
        }
    }
}

/// Delivery lifecycle: `SENT -> DELIVERED -> READ`, or `SENT -> FAILED`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Delivered => "DELIVERED",
            Self::Read => "READ",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SENT" => Some(Self::Sent),
            "DELIVERED" => Some(Self::Delivered),
            "READ" => Some(Self::Read),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Forward-only transitions; skipping DELIVERED on the way to READ is allowed
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Sent, Self::Delivered | Self::Read | Self::Failed)
                | (Self::Delivered, Self::Read)
        )
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unfurled metadata carried by LINK messages
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkPreview {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Exactly one of recipient or community
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTarget {
    Direct(Snowflake),
    Community(Snowflake),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Snowflake,
    pub conversation_id: ConversationId,
    pub sender_id: Snowflake,
    /// Display name captured at send time for community messages
    pub sender_name: Option<String>,
    pub target: MessageTarget,
    pub content: String,
    /// Opaque object-storage references
    pub attachments: Vec<String>,
    pub kind: MessageKind,
    pub link_preview: Option<LinkPreview>,
    pub status: MessageStatus,
    pub is_read: bool,
    pub is_delivered: bool,
    /// Per-conversation position assigned by the store
    pub sequence: i64,
    /// Assigned by the store on insert
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Unsaved direct message; `sequence` and `created_at` are set by the store
    pub fn direct(
        id: Snowflake,
        sender_id: Snowflake,
        recipient_id: Snowflake,
        content: String,
    ) -> Result<Self, DomainError> {
        let conversation_id =
            ConversationId::direct(sender_id, recipient_id).ok_or(DomainError::SelfConversation)?;
        Ok(Self::unsaved(
            id,
            conversation_id,
            sender_id,
            MessageTarget::Direct(recipient_id),
            content,
        ))
    }

    /// Unsaved community message
    pub fn group(id: Snowflake, sender_id: Snowflake, community_id: Snowflake, content: String) -> Self {
        Self::unsaved(
            id,
            ConversationId::community(community_id),
            sender_id,
            MessageTarget::Community(community_id),
            content,
        )
    }

    fn unsaved(
        id: Snowflake,
        conversation_id: ConversationId,
        sender_id: Snowflake,
        target: MessageTarget,
        content: String,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender_id,
            sender_name: None,
            target,
            content,
            attachments: Vec::new(),
            kind: MessageKind::Text,
            link_preview: None,
            status: MessageStatus::Sent,
            is_read: false,
            is_delivered: false,
            sequence: 0,
            created_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        self
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_link_preview(mut self, preview: Option<LinkPreview>) -> Self {
        self.link_preview = preview;
        self
    }

    pub fn with_sender_name(mut self, name: Option<String>) -> Self {
        self.sender_name = name;
        self
    }

    pub fn recipient_id(&self) -> Option<Snowflake> {
        match self.target {
            MessageTarget::Direct(id) => Some(id),
            MessageTarget::Community(_) => None,
        }
    }

    pub fn community_id(&self) -> Option<Snowflake> {
        match self.target {
            MessageTarget::Community(id) => Some(id),
            MessageTarget::Direct(_) => None,
        }
    }

    /// Checks body, kind and target consistency before the message is stored
    pub fn validate(&self, max_len: usize) -> Result<(), DomainError> {
        let content = self.content.trim();
        if content.is_empty() && self.attachments.is_empty() {
            return Err(DomainError::EmptyMessage);
        }
        if self.content.chars().count() > max_len {
            return Err(DomainError::ContentTooLong { max: max_len });
        }
        if self.kind == MessageKind::Link && content.is_empty() {
            return Err(DomainError::ValidationError(
                "link messages need a URL as content".into(),
            ));
        }
        if self.kind != MessageKind::Link && self.link_preview.is_some() {
            return Err(DomainError::ValidationError(
                "only link messages carry a preview".into(),
            ));
        }
        self.validate_target()
    }

    /// The conversation id must agree with the target
    pub fn validate_target(&self) -> Result<(), DomainError> {
        let consistent = match self.target {
            MessageTarget::Direct(recipient) => {
                ConversationId::direct(self.sender_id, recipient) == Some(self.conversation_id)
            }
            MessageTarget::Community(community) => {
                self.conversation_id == ConversationId::community(community)
            }
        };
        if consistent {
            Ok(())
        } else {
            Err(DomainError::ValidationError(format!(
                "message target does not match conversation {}",
                self.conversation_id
            )))
        }
    }

    /// Applies a forward transition; false when it would be a no-op or a regression
    pub fn advance_to(&mut self, next: MessageStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        match next {
            MessageStatus::Delivered => self.is_delivered = true,
            MessageStatus::Read => {
                self.is_delivered = true;
                self.is_read = true;
            }
            MessageStatus::Sent | MessageStatus::Failed => {}
        }
        true
    }

    /// Whether `user_id` is the recipient of this direct message
    pub fn is_addressed_to(&self, user_id: Snowflake) -> bool {
        self.recipient_id() == Some(user_id)
    }
}
