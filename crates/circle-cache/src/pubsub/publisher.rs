//! Redis Pub/Sub publisher.
//!
//! Publishes store events and notifications to Redis channels so other
//! engine instances and push gateways can react to them.

use crate::pool::{RedisPool, RedisResult};
use crate::pubsub::PubSubChannel;
use circle_core::{Notification, StoreEvent};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

/// Event type carried by pushed notifications
pub const NOTIFICATION_EVENT: &str = "NOTIFICATION";

/// Event wrapper for Pub/Sub messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubEvent {
    /// Event type name (e.g., "MESSAGE_WRITTEN", "NOTIFICATION")
    pub event_type: String,
    /// Event payload
    pub data: serde_json::Value,
    /// Instance that published the event, so it can skip its own echo
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub origin: Option<String>,
}

impl PubSubEvent {
    /// Create a new event
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            origin: None,
        }
    }

    /// Wrap a store event
    pub fn store(event: &StoreEvent) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event.event_type(), serde_json::to_value(event)?))
    }

    /// Wrap a notification for push delivery
    pub fn notification(notification: &Notification) -> Result<Self, serde_json::Error> {
        Ok(Self::new(NOTIFICATION_EVENT, serde_json::to_value(notification)?))
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// The store event inside, if this is one
    #[must_use]
    pub fn store_event(&self) -> Option<StoreEvent> {
        serde_json::from_value(self.data.clone()).ok()
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Redis Pub/Sub publisher
#[derive(Clone, Debug)]
pub struct Publisher {
    pool: RedisPool,
}

impl Publisher {
    /// Create a new publisher
    #[must_use]
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Publish an event to a channel
    pub async fn publish(&self, channel: &PubSubChannel, event: &PubSubEvent) -> RedisResult<u32> {
        let mut conn = self.pool.get().await?;
        let channel_name = channel.name();
        let payload = event.to_json()?;

        let receivers: u32 = conn.publish(&channel_name, &payload).await?;

        tracing::debug!(
            channel = %channel_name,
            event_type = %event.event_type,
            receivers = receivers,
            "Published event"
        );

        Ok(receivers)
    }

    /// Publish a store event once, on the channel of its first topic.
    /// Receivers fan it out to every topic themselves.
    pub async fn publish_store_event(&self, event: &StoreEvent, origin: &str) -> RedisResult<u32> {
        let Some(topic) = event.topics().into_iter().next() else {
            return Ok(0);
        };
        let envelope = PubSubEvent::store(event)?.with_origin(origin);
        self.publish(&PubSubChannel::feed(topic), &envelope).await
    }

    /// Push a notification to its recipient's channel
    pub async fn publish_notification(&self, notification: &Notification) -> RedisResult<u32> {
        let event = PubSubEvent::notification(notification)?;
        self.publish(&PubSubChannel::notifications(notification.user_id), &event)
            .await
    }
}
