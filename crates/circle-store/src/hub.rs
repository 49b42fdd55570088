//! In-process change feed
//!
//! Watchers are grouped by topic in a `DashMap`. Listeners are cloned out of
//! the map before they run, so a listener may watch or cancel without
//! deadlocking the shard it was stored in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use circle_core::{ChangeFeed, FeedListener, FeedTopic, StoreEvent, Subscription};
use dashmap::DashMap;

#[derive(Default)]
struct Watchers {
    next_id: AtomicU64,
    by_topic: DashMap<FeedTopic, HashMap<u64, FeedListener>>,
}

impl Watchers {
    fn remove(&self, topic: FeedTopic, id: u64) {
        self.by_topic.alter(&topic, |_, mut listeners| {
            listeners.remove(&id);
            listeners
        });
        self.by_topic.remove_if(&topic, |_, listeners| listeners.is_empty());
    }
}

/// Change feed shared by every in-memory repository
#[derive(Clone, Default)]
pub struct ChangeHub {
    watchers: Arc<Watchers>,
}

impl ChangeHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Listeners currently registered on one topic
    pub fn watchers_of(&self, topic: FeedTopic) -> usize {
        self.watchers
            .by_topic
            .get(&topic)
            .map_or(0, |listeners| listeners.len())
    }

    /// Synchronous fan-out used by adapters that relay remote events
    pub fn dispatch(&self, event: &StoreEvent) {
        for topic in event.topics() {
            let listeners: Vec<FeedListener> = match self.watchers.by_topic.get(&topic) {
                Some(entry) => entry.values().cloned().collect(),
                None => continue,
            };
            tracing::trace!(topic = %topic.name(), listeners = listeners.len(), "Dispatching store event");
            for listener in listeners {
                listener(event);
            }
        }
    }
}

#[async_trait]
impl ChangeFeed for ChangeHub {
    fn watch(&self, topic: FeedTopic, listener: FeedListener) -> Subscription {
        let id = self.watchers.next_id.fetch_add(1, Ordering::Relaxed);
        self.watchers
            .by_topic
            .entry(topic)
            .or_default()
            .insert(id, listener);

        tracing::debug!(topic = %topic.name(), watcher_id = id, "Watcher registered");

        let weak: Weak<Watchers> = Arc::downgrade(&self.watchers);
        Subscription::new(topic, move || {
            if let Some(watchers) = weak.upgrade() {
                watchers.remove(topic, id);
                tracing::debug!(topic = %topic.name(), watcher_id = id, "Watcher removed");
            }
        })
    }

    async fn publish(&self, event: StoreEvent) {
        self.dispatch(&event);
    }

    fn watcher_count(&self) -> usize {
        self.watchers
            .by_topic
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use circle_core::Snowflake;
    use std::sync::atomic::AtomicUsize;

    fn presence_event(user: i64) -> StoreEvent {
        StoreEvent::PresenceChanged {
            user_id: Snowflake::new(user),
            online: true,
            at: Utc::now(),
        }
    }

    fn counting_listener(counter: &Arc<AtomicUsize>) -> FeedListener {
        let counter = Arc::clone(counter);
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_publish_reaches_topic_watchers_only() {
        let hub = ChangeHub::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let _sub = hub.watch(
            FeedTopic::Presence(Snowflake::new(1)),
            counting_listener(&hits),
        );

        hub.publish(presence_event(1)).await;
        hub.publish(presence_event(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_removes_watcher() {
        let hub = ChangeHub::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let topic = FeedTopic::Presence(Snowflake::new(1));
        let sub = hub.watch(topic, counting_listener(&hits));
        assert_eq!(hub.watcher_count(), 1);

        sub.cancel();
        sub.cancel();
        assert_eq!(hub.watcher_count(), 0);
        assert_eq!(hub.watchers_of(topic), 0);

        hub.publish(presence_event(1)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_listener_may_cancel_itself() {
        let hub = ChangeHub::new();
        let topic = FeedTopic::Presence(Snowflake::new(1));
        let slot: Arc<std::sync::Mutex<Option<Subscription>>> = Arc::default();
        let inner = Arc::clone(&slot);
        let sub = hub.watch(
            topic,
            Arc::new(move |_| {
                if let Some(sub) = inner.lock().unwrap().take() {
                    sub.cancel();
                }
            }),
        );
        *slot.lock().unwrap() = Some(sub);

        hub.publish(presence_event(1)).await;
        assert_eq!(hub.watcher_count(), 0);
    }
}
