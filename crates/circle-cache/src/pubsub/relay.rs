//! Cross-instance change feed.
//!
//! [`RedisChangeFeed`] keeps watchers in a local [`ChangeHub`]. Publishing
//! dispatches locally and relays the event through Redis; a background
//! listener pattern-subscribes to every feed channel and dispatches events
//! published by other instances into the same hub.

use std::sync::Arc;

use async_trait::async_trait;
use circle_core::{ChangeFeed, FeedListener, FeedTopic, StoreEvent, Subscription};
use circle_store::ChangeHub;
use futures_util::StreamExt;
use redis::Client;
use tokio::task::JoinHandle;

use crate::pool::RedisPool;
use crate::pubsub::{PubSubEvent, Publisher, FEED_CHANNEL_PATTERN};

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Redis connection URL for the dedicated Pub/Sub connection
    pub redis_url: String,
    /// Reconnection delay in milliseconds
    pub reconnect_delay_ms: u64,
    /// Tag stamped on outgoing events so the listener can drop its own echo
    pub instance_id: String,
}

impl RelayConfig {
    #[must_use]
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            ..Self::default()
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            reconnect_delay_ms: 1000,
            instance_id: format!("{:016x}", rand::random::<u64>()),
        }
    }
}

/// Change feed shared across engine instances through Redis Pub/Sub
pub struct RedisChangeFeed {
    hub: Arc<ChangeHub>,
    publisher: Publisher,
    instance_id: String,
    listener: JoinHandle<()>,
}

impl RedisChangeFeed {
    /// Start the background listener and return the feed
    #[must_use]
    pub fn start(pool: RedisPool, config: RelayConfig) -> Arc<Self> {
        let hub = ChangeHub::new_shared();
        let listener = tokio::spawn(listener_loop(config.clone(), hub.clone()));

        tracing::info!(instance_id = %config.instance_id, "Change feed relay started");

        Arc::new(Self {
            hub,
            publisher: Publisher::new(pool),
            instance_id: config.instance_id,
            listener,
        })
    }

    /// The local hub remote events are dispatched into
    #[must_use]
    pub fn hub(&self) -> &Arc<ChangeHub> {
        &self.hub
    }

    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Stop relaying remote events; local watchers keep working
    pub fn shutdown(&self) {
        self.listener.abort();
    }
}

impl Drop for RedisChangeFeed {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait]
impl ChangeFeed for RedisChangeFeed {
    fn watch(&self, topic: FeedTopic, listener: FeedListener) -> Subscription {
        self.hub.watch(topic, listener)
    }

    async fn publish(&self, event: StoreEvent) {
        self.hub.dispatch(&event);
        if let Err(e) = self
            .publisher
            .publish_store_event(&event, &self.instance_id)
            .await
        {
            tracing::warn!(error = %e, event_type = event.event_type(), "Failed to relay store event");
        }
    }

    fn watcher_count(&self) -> usize {
        self.hub.watcher_count()
    }
}

/// Decode a relayed payload, dropping our own echoes and foreign messages
fn decode_remote(payload: &str, instance_id: &str) -> Option<StoreEvent> {
    let envelope: PubSubEvent = match serde_json::from_str(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping malformed feed message");
            return None;
        }
    };
    if envelope.origin.as_deref() == Some(instance_id) {
        return None;
    }
    envelope.store_event()
}

async fn listener_loop(config: RelayConfig, hub: Arc<ChangeHub>) {
    loop {
        match run_listener(&config, &hub).await {
            Ok(()) => tracing::warn!("Feed relay stream ended, reconnecting..."),
            Err(e) => tracing::error!(error = %e, "Feed relay error, reconnecting..."),
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(config.reconnect_delay_ms)).await;
    }
}

/// Run the listener until the stream ends or errors
async fn run_listener(config: &RelayConfig, hub: &ChangeHub) -> redis::RedisResult<()> {
    let client = Client::open(config.redis_url.as_str())?;
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.psubscribe(FEED_CHANNEL_PATTERN).await?;

    tracing::info!(pattern = FEED_CHANNEL_PATTERN, "Feed relay connected to Redis");

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable feed payload");
                continue;
            }
        };
        if let Some(event) = decode_remote(&payload, &config.instance_id) {
            tracing::trace!(
                channel = %msg.get_channel_name(),
                event_type = event.event_type(),
                "Relaying remote store event"
            );
            hub.dispatch(&event);
        }
    }
    Ok(())
}
