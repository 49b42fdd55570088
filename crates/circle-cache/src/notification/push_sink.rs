//! Notification sink that pushes to per-user Redis channels.
//!
//! Optionally persists to an inner sink first (e.g. the PostgreSQL inbox)
//! so a push is never sent for a notification that failed to store.

use std::sync::Arc;

use async_trait::async_trait;
use circle_core::{Notification, NotificationSink, RepoResult};

use crate::pubsub::Publisher;

pub struct RedisNotificationSink {
    publisher: Publisher,
    store: Option<Arc<dyn NotificationSink>>,
}

impl RedisNotificationSink {
    #[must_use]
    pub fn new(publisher: Publisher) -> Self {
        Self {
            publisher,
            store: None,
        }
    }

    /// Persist through `store` before pushing
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn NotificationSink>) -> Self {
        self.store = Some(store);
        self
    }
}

#[async_trait]
impl NotificationSink for RedisNotificationSink {
    async fn notify(&self, notification: &Notification) -> RepoResult<()> {
        if let Some(store) = &self.store {
            store.notify(notification).await?;
        }

        let receivers = self.publisher.publish_notification(notification).await?;
        tracing::debug!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            receivers,
            "Notification pushed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{RedisPool, RedisPoolConfig};
    use chrono::Utc;
    use circle_core::{DomainError, NotificationKind, Snowflake};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingStore(AtomicUsize);

    #[async_trait]
    impl NotificationSink for FailingStore {
        async fn notify(&self, _: &Notification) -> RepoResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(DomainError::StoreFailure("inbox down".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_skips_push() {
        // Unreachable port: reaching the publisher would surface a
        // connection error instead of the store's.
        let pool = RedisPool::new(RedisPoolConfig {
            url: "redis://127.0.0.1:1".into(),
            max_connections: 1,
        })
        .unwrap();
        let store = Arc::new(FailingStore(AtomicUsize::new(0)));
        let sink = RedisNotificationSink::new(Publisher::new(pool)).with_store(store.clone());

        let notification = Notification::new(
            Snowflake::new(1),
            Snowflake::new(2),
            NotificationKind::JoinApproved,
            "Welcome",
            "Your request was approved",
            Utc::now(),
        );
        let err = sink.notify(&notification).await.unwrap_err();

        assert_eq!(err.to_string(), "Store failure: inbox down");
        assert_eq!(store.0.load(Ordering::SeqCst), 1);
    }
}
