//! # circle-store
//!
//! Document store held in process memory. Every repository publishes its
//! writes to a shared [`ChangeHub`], which backs live subscriptions.

pub mod hub;
pub mod repositories;

use std::sync::Arc;

use circle_core::{ChangeFeed, Clock, SystemClock};

pub use hub::ChangeHub;
pub use repositories::{
    MemoryCommunityRepository, MemoryConversationRepository, MemoryMessageRepository,
    MemoryNotificationStore, MemoryPresenceRepository, MemoryUserDirectory,
    DEFAULT_INBOX_CAPACITY,
};

/// Every in-memory repository wired to one change hub and clock
#[derive(Clone)]
pub struct MemoryStore {
    pub hub: Arc<ChangeHub>,
    pub communities: Arc<MemoryCommunityRepository>,
    pub conversations: Arc<MemoryConversationRepository>,
    pub messages: Arc<MemoryMessageRepository>,
    pub notifications: Arc<MemoryNotificationStore>,
    pub presence: Arc<MemoryPresenceRepository>,
    pub users: Arc<MemoryUserDirectory>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let hub = ChangeHub::new_shared();
        let feed: Arc<dyn ChangeFeed> = hub.clone();
        Self {
            communities: Arc::new(MemoryCommunityRepository::new(feed.clone(), clock.clone())),
            conversations: Arc::new(MemoryConversationRepository::new(
                feed.clone(),
                clock.clone(),
            )),
            messages: Arc::new(MemoryMessageRepository::new(feed.clone(), clock.clone())),
            notifications: Arc::new(MemoryNotificationStore::new(feed.clone(), clock)),
            presence: Arc::new(MemoryPresenceRepository::new(feed)),
            users: Arc::new(MemoryUserDirectory::new()),
            hub,
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
