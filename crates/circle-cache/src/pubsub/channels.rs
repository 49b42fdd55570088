//! Pub/Sub channel definitions.
//!
//! Store events travel on `circle:feed:<topic>`; pushed notifications on
//! `circle:notify:<user id>`.

use circle_core::{FeedTopic, Snowflake};

/// Channel prefix for store events, followed by the feed topic name
pub const FEED_CHANNEL_PREFIX: &str = "circle:feed:";
/// Pattern matching every store event channel
pub const FEED_CHANNEL_PATTERN: &str = "circle:feed:*";
/// Channel prefix for notifications pushed to one user
pub const NOTIFY_CHANNEL_PREFIX: &str = "circle:notify:";

/// Pub/Sub channel types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PubSubChannel {
    /// Store events of one feed topic
    Feed(FeedTopic),
    /// Notifications for a specific user (all their devices)
    Notifications(Snowflake),
    /// Anything this crate does not name
    Custom(String),
}

impl PubSubChannel {
    #[must_use]
    pub fn feed(topic: FeedTopic) -> Self {
        Self::Feed(topic)
    }

    #[must_use]
    pub fn notifications(user_id: Snowflake) -> Self {
        Self::Notifications(user_id)
    }

    /// Get the Redis channel name
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Feed(topic) => format!("{FEED_CHANNEL_PREFIX}{}", topic.name()),
            Self::Notifications(id) => format!("{NOTIFY_CHANNEL_PREFIX}{id}"),
            Self::Custom(name) => name.clone(),
        }
    }

    /// Parse a channel name back to a `PubSubChannel`
    #[must_use]
    pub fn parse(name: &str) -> Self {
        if let Some(topic) = name
            .strip_prefix(FEED_CHANNEL_PREFIX)
            .and_then(FeedTopic::parse)
        {
            return Self::Feed(topic);
        }

        if let Some(id) = name
            .strip_prefix(NOTIFY_CHANNEL_PREFIX)
            .and_then(|id| Snowflake::parse(id).ok())
        {
            return Self::Notifications(id);
        }

        Self::Custom(name.to_string())
    }
}

impl std::fmt::Display for PubSubChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
