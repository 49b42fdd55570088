//! In-memory presence records

use std::sync::Arc;

use async_trait::async_trait;
use circle_core::{ChangeFeed, Presence, PresenceRepository, RepoResult, Snowflake, StoreEvent};
use dashmap::DashMap;

pub struct MemoryPresenceRepository {
    records: DashMap<Snowflake, Presence>,
    feed: Arc<dyn ChangeFeed>,
}

impl MemoryPresenceRepository {
    pub fn new(feed: Arc<dyn ChangeFeed>) -> Self {
        Self {
            records: DashMap::new(),
            feed,
        }
    }
}

#[async_trait]
impl PresenceRepository for MemoryPresenceRepository {
    async fn get(&self, user_id: Snowflake) -> RepoResult<Option<Presence>> {
        Ok(self.records.get(&user_id).map(|p| *p))
    }

    async fn set(&self, presence: &Presence) -> RepoResult<()> {
        let previous = self.records.insert(presence.user_id, *presence);
        if previous.is_some_and(|p| p == *presence) {
            return Ok(());
        }
        self.feed
            .publish(StoreEvent::PresenceChanged {
                user_id: presence.user_id,
                online: presence.online,
                at: presence.last_seen,
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChangeHub;
    use chrono::Utc;
    use circle_core::FeedTopic;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_set_publishes_only_on_change() {
        let hub = Arc::new(ChangeHub::new());
        let repo = MemoryPresenceRepository::new(hub.clone());
        let user = Snowflake::new(5);

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let _sub = hub.watch(
            FeedTopic::Presence(user),
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let now = Utc::now();
        repo.set(&Presence::online(user, now)).await.unwrap();
        repo.set(&Presence::online(user, now)).await.unwrap();
        repo.set(&Presence::offline(user, now)).await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(!repo.get(user).await.unwrap().unwrap().online);
    }
}
