//! Store events - emitted by every store write
//!
//! Subscribers do not receive documents in the event. They re-run their
//! query when an event arrives on a topic they watch, so every delivery
//! reflects the full current result set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ConversationId, Snowflake};

/// Addressable stream of changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "topic", content = "id", rename_all = "snake_case")]
pub enum FeedTopic {
    Community(Snowflake),
    Conversation(ConversationId),
    /// Conversation list of one user
    Inbox(Snowflake),
    Notifications(Snowflake),
    Presence(Snowflake),
}

impl FeedTopic {
    /// Stable string name, e.g. `conversation:dm_1_2`
    pub fn name(&self) -> String {
        match self {
            Self::Community(id) => format!("community:{id}"),
            Self::Conversation(id) => format!("conversation:{id}"),
            Self::Inbox(id) => format!("inbox:{id}"),
            Self::Notifications(id) => format!("notifications:{id}"),
            Self::Presence(id) => format!("presence:{id}"),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let (kind, id) = name.split_once(':')?;
        match kind {
            "community" => Snowflake::parse(id).ok().map(Self::Community),
            "conversation" => ConversationId::parse(id).ok().map(Self::Conversation),
            "inbox" => Snowflake::parse(id).ok().map(Self::Inbox),
            "notifications" => Snowflake::parse(id).ok().map(Self::Notifications),
            "presence" => Snowflake::parse(id).ok().map(Self::Presence),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreEvent {
    CommunityChanged {
        community_id: Snowflake,
        at: DateTime<Utc>,
    },
    ConversationChanged {
        conversation_id: ConversationId,
        at: DateTime<Utc>,
    },
    /// Insert or status change of a message
    MessageWritten {
        conversation_id: ConversationId,
        message_id: Option<Snowflake>,
        at: DateTime<Utc>,
    },
    NotificationCreated {
        user_id: Snowflake,
        notification_id: Snowflake,
        at: DateTime<Utc>,
    },
    PresenceChanged {
        user_id: Snowflake,
        online: bool,
        at: DateTime<Utc>,
    },
}

impl StoreEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CommunityChanged { .. } => "COMMUNITY_CHANGED",
            Self::ConversationChanged { .. } => "CONVERSATION_CHANGED",
            Self::MessageWritten { .. } => "MESSAGE_WRITTEN",
            Self::NotificationCreated { .. } => "NOTIFICATION_CREATED",
            Self::PresenceChanged { .. } => "PRESENCE_CHANGED",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::CommunityChanged { at, .. }
            | Self::ConversationChanged { at, .. }
            | Self::MessageWritten { at, .. }
            | Self::NotificationCreated { at, .. }
            | Self::PresenceChanged { at, .. } => *at,
        }
    }

    /// Every topic whose watchers must re-query after this event
    pub fn topics(&self) -> Vec<FeedTopic> {
        match self {
            Self::CommunityChanged { community_id, .. } => vec![FeedTopic::Community(*community_id)],
            Self::ConversationChanged {
                conversation_id, ..
            }
            | Self::MessageWritten {
                conversation_id, ..
            } => {
                let mut topics = vec![FeedTopic::Conversation(*conversation_id)];
                if let Some((low, high)) = conversation_id.participants() {
                    topics.push(FeedTopic::Inbox(low));
                    topics.push(FeedTopic::Inbox(high));
                }
                topics
            }
            Self::NotificationCreated { user_id, .. } => vec![FeedTopic::Notifications(*user_id)],
            Self::PresenceChanged { user_id, .. } => vec![FeedTopic::Presence(*user_id)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names_parse_back() {
        let dm = ConversationId::direct(Snowflake::new(1), Snowflake::new(2)).unwrap();
        for topic in [
            FeedTopic::Community(Snowflake::new(5)),
            FeedTopic::Conversation(dm),
            FeedTopic::Inbox(Snowflake::new(1)),
            FeedTopic::Notifications(Snowflake::new(1)),
            FeedTopic::Presence(Snowflake::new(1)),
        ] {
            assert_eq!(FeedTopic::parse(&topic.name()), Some(topic));
        }
        assert_eq!(FeedTopic::Conversation(dm).name(), "conversation:dm_1_2");
        assert_eq!(FeedTopic::parse("bogus:1"), None);
    }

    #[test]
    fn test_direct_message_touches_both_inboxes() {
        let dm = ConversationId::direct(Snowflake::new(1), Snowflake::new(2)).unwrap();
        let event = StoreEvent::MessageWritten {
            conversation_id: dm,
            message_id: Some(Snowflake::new(9)),
            at: Utc::now(),
        };
        let topics = event.topics();
        assert!(topics.contains(&FeedTopic::Conversation(dm)));
        assert!(topics.contains(&FeedTopic::Inbox(Snowflake::new(1))));
        assert!(topics.contains(&FeedTopic::Inbox(Snowflake::new(2))));
    }

    #[test]
    fn test_community_message_has_no_inbox() {
        let event = StoreEvent::MessageWritten {
            conversation_id: ConversationId::community(Snowflake::new(3)),
            message_id: None,
            at: Utc::now(),
        };
        assert_eq!(event.topics().len(), 1);
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = StoreEvent::PresenceChanged {
            user_id: Snowflake::new(4),
            online: true,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PRESENCE_CHANGED");
        let back: StoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
