//! Test helpers for integration tests
//!
//! [`TestEngine`] owns an in-memory store, a manual clock and a service
//! context with every port wired, and hands out the services borrowing it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use circle_common::EngineConfig;
use circle_core::{Community, ManualClock, MemberRole, Snowflake, UserProfile};
use circle_service::{
    CommunityService, ConversationDirectory, InviteService, MembershipService, MessageService,
    ModerationService, NotificationDispatcher, PermissionService, ServiceContext, ServiceContextBuilder,
    SubscriptionService,
};
use circle_store::MemoryStore;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::fixtures::{community_request, username, USERS};

/// Engine instance backed by the in-memory store
pub struct TestEngine {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub ctx: ServiceContext,
}

impl TestEngine {
    /// Start an engine with default configuration
    pub fn start() -> Result<Self> {
        Self::start_with_config(EngineConfig::default())
    }

    /// Start an engine with custom config
    pub fn start_with_config(config: EngineConfig) -> Result<Self> {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
            .single()
            .ok_or_else(|| anyhow::anyhow!("invalid start time"))?;
        let clock = Arc::new(ManualClock::new(start));
        let store = MemoryStore::new(clock.clone());
        for id in USERS {
            store.users.insert(UserProfile::new(id, username(id)));
        }

        let ctx = ServiceContextBuilder::new()
            .community_repo(store.communities.clone())
            .conversation_repo(store.conversations.clone())
            .message_repo(store.messages.clone())
            .presence_repo(store.presence.clone())
            .user_directory(store.users.clone())
            .notification_sink(store.notifications.clone())
            .notification_repo(store.notifications.clone())
            .feed(store.hub.clone())
            .clock(clock.clone())
            .config(config)
            .build()?;

        Ok(Self { store, clock, ctx })
    }

    pub fn communities(&self) -> CommunityService<'_> {
        CommunityService::new(&self.ctx)
    }

    pub fn membership(&self) -> MembershipService<'_> {
        MembershipService::new(&self.ctx)
    }

    pub fn moderation(&self) -> ModerationService<'_> {
        ModerationService::new(&self.ctx)
    }

    pub fn invites(&self) -> InviteService<'_> {
        InviteService::new(&self.ctx)
    }

    pub fn messages(&self) -> MessageService<'_> {
        MessageService::new(&self.ctx)
    }

    pub fn conversations(&self) -> ConversationDirectory<'_> {
        ConversationDirectory::new(&self.ctx)
    }

    pub fn notifications(&self) -> NotificationDispatcher<'_> {
        NotificationDispatcher::new(&self.ctx)
    }

    pub fn subscriptions(&self) -> SubscriptionService<'_> {
        SubscriptionService::new(&self.ctx)
    }

    /// Move the manual clock forward
    pub fn advance(&self, by: chrono::Duration) {
        self.clock.advance(by);
    }

    /// A community created by `creator` with only the creator in it
    pub async fn community(&self, creator: Snowflake, public: bool) -> Result<Community> {
        Ok(self
            .communities()
            .create(creator, community_request(public))
            .await?)
    }

    pub async fn role(&self, community_id: Snowflake, user_id: Snowflake) -> Result<MemberRole> {
        Ok(PermissionService::new(&self.ctx).role(community_id, user_id).await?)
    }

    /// Current stored state of a community
    pub async fn reload(&self, community_id: Snowflake) -> Result<Community> {
        Ok(self.communities().get(community_id).await?)
    }
}

/// Wait for the next value a subscription callback forwarded
pub async fn next_snapshot<T>(rx: &mut UnboundedReceiver<T>) -> Option<T> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .ok()
        .flatten()
}

/// Drain snapshots until one satisfies `pred`, or give up after a timeout
pub async fn wait_for_snapshot<T>(
    rx: &mut UnboundedReceiver<T>,
    pred: impl Fn(&T) -> bool,
) -> Option<T> {
    while let Some(snapshot) = next_snapshot(rx).await {
        if pred(&snapshot) {
            return Some(snapshot);
        }
    }
    None
}
