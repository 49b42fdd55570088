//! Change feed port

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::events::{FeedTopic, StoreEvent};

/// Invoked for every event published on a watched topic.
/// Must not block; heavy work belongs on a task the listener wakes.
pub type FeedListener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Register a listener until the returned subscription is cancelled
    fn watch(&self, topic: FeedTopic, listener: FeedListener) -> Subscription;

    /// Deliver an event to every watcher of each of its topics
    async fn publish(&self, event: StoreEvent);

    /// Live watchers across all topics
    fn watcher_count(&self) -> usize;
}

type CancelHook = Box<dyn FnOnce() + Send>;

/// Registration handle returned by [`ChangeFeed::watch`].
///
/// `cancel` may be called any number of times; only the first call runs
/// the unregister hook. Dropping the handle cancels it.
pub struct Subscription {
    topic: FeedTopic,
    active: AtomicBool,
    hook: Mutex<Option<CancelHook>>,
}

impl Subscription {
    pub fn new(topic: FeedTopic, on_cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            topic,
            active: AtomicBool::new(true),
            hook: Mutex::new(Some(Box::new(on_cancel))),
        }
    }

    pub fn topic(&self) -> FeedTopic {
        self.topic
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let hook = match self.hook.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::Snowflake;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_cancel_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = Subscription::new(FeedTopic::Presence(Snowflake::new(1)), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(sub.is_active());
        sub.cancel();
        sub.cancel();
        assert!(!sub.is_active());
        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_cancels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        {
            let _sub = Subscription::new(FeedTopic::Inbox(Snowflake::new(1)), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
