//! In-memory notification inbox

use std::sync::Arc;

use async_trait::async_trait;
use circle_core::{
    ChangeFeed, Clock, Notification, NotificationRepository, NotificationSink, RepoResult,
    Snowflake, StoreEvent,
};
use dashmap::DashMap;

/// Keeps at most this many notifications per user; older ones are dropped
pub const DEFAULT_INBOX_CAPACITY: usize = 200;

pub struct MemoryNotificationStore {
    inboxes: DashMap<Snowflake, Vec<Notification>>,
    capacity: usize,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
}

impl MemoryNotificationStore {
    pub fn new(feed: Arc<dyn ChangeFeed>, clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(feed, clock, DEFAULT_INBOX_CAPACITY)
    }

    pub fn with_capacity(feed: Arc<dyn ChangeFeed>, clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            inboxes: DashMap::new(),
            capacity: capacity.max(1),
            feed,
            clock,
        }
    }

    /// Everything delivered to a user, oldest first
    pub fn delivered_to(&self, user_id: Snowflake) -> Vec<Notification> {
        self.inboxes
            .get(&user_id)
            .map(|inbox| inbox.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationStore {
    async fn notify(&self, notification: &Notification) -> RepoResult<()> {
        {
            let mut inbox = self.inboxes.entry(notification.user_id).or_default();
            inbox.push(notification.clone());
            let overflow = inbox.len().saturating_sub(self.capacity);
            inbox.drain(..overflow);
        }
        tracing::debug!(
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            "Notification stored"
        );
        self.feed
            .publish(StoreEvent::NotificationCreated {
                user_id: notification.user_id,
                notification_id: notification.id,
                at: self.clock.now(),
            })
            .await;
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotificationStore {
    async fn find_by_user(
        &self,
        user_id: Snowflake,
        unread_only: bool,
        limit: usize,
    ) -> RepoResult<Vec<Notification>> {
        Ok(self
            .inboxes
            .get(&user_id)
            .map(|inbox| {
                inbox
                    .iter()
                    .rev()
                    .filter(|n| !unread_only || !n.read)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn mark_read(&self, user_id: Snowflake, id: Snowflake) -> RepoResult<bool> {
        let Some(mut inbox) = self.inboxes.get_mut(&user_id) else {
            return Ok(false);
        };
        let flipped = match inbox.iter_mut().find(|n| n.id == id && !n.read) {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        };
        Ok(flipped)
    }

    async fn unread_count(&self, user_id: Snowflake) -> RepoResult<i64> {
        Ok(self
            .inboxes
            .get(&user_id)
            .map_or(0, |inbox| inbox.iter().filter(|n| !n.read).count() as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChangeHub;
    use circle_core::{ManualClock, NotificationKind};

    fn note(id: i64, user: i64, clock: &ManualClock) -> Notification {
        Notification::new(
            Snowflake::new(id),
            Snowflake::new(user),
            NotificationKind::JoinApproved,
            "Welcome",
            "Your request was approved",
            clock.now(),
        )
    }

    #[tokio::test]
    async fn test_inbox_newest_first_and_unread() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryNotificationStore::new(Arc::new(ChangeHub::new()), clock.clone());
        for id in 1..=3 {
            store.notify(&note(id, 7, &clock)).await.unwrap();
        }

        let listed = store.find_by_user(Snowflake::new(7), false, 10).await.unwrap();
        let ids: Vec<i64> = listed.iter().map(|n| n.id.into_inner()).collect();
        assert_eq!(ids, [3, 2, 1]);

        assert!(store.mark_read(Snowflake::new(7), Snowflake::new(2)).await.unwrap());
        assert!(!store.mark_read(Snowflake::new(7), Snowflake::new(2)).await.unwrap());
        assert_eq!(store.unread_count(Snowflake::new(7)).await.unwrap(), 2);

        let unread = store.find_by_user(Snowflake::new(7), true, 10).await.unwrap();
        assert_eq!(unread.len(), 2);
    }

    #[tokio::test]
    async fn test_capacity_drops_oldest() {
        let clock = Arc::new(ManualClock::default());
        let store =
            MemoryNotificationStore::with_capacity(Arc::new(ChangeHub::new()), clock.clone(), 2);
        for id in 1..=3 {
            store.notify(&note(id, 7, &clock)).await.unwrap();
        }
        let kept: Vec<i64> = store
            .delivered_to(Snowflake::new(7))
            .iter()
            .map(|n| n.id.into_inner())
            .collect();
        assert_eq!(kept, [2, 3]);
    }
}
