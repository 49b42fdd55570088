//! In-memory wiring shared by the service unit tests

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use circle_common::EngineConfig;
use circle_core::{Community, ManualClock, Snowflake, UserProfile};
use circle_store::MemoryStore;

use super::context::{ServiceContext, ServiceContextBuilder};
use super::community::CommunityService;
use super::membership::MembershipService;
use crate::dto::CreateCommunityRequest;

pub(crate) const CREATOR: Snowflake = Snowflake::new(1);
pub(crate) const ADMIN: Snowflake = Snowflake::new(2);
pub(crate) const MEMBER: Snowflake = Snowflake::new(3);
pub(crate) const OUTSIDER: Snowflake = Snowflake::new(9);

pub(crate) struct Harness {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub ctx: ServiceContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let store = MemoryStore::new(clock.clone());
        for (id, name) in [(CREATOR, "creator"), (ADMIN, "admin"), (MEMBER, "member")] {
            store.users.insert(UserProfile::new(id, name));
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
            .build()
            .unwrap();
        Self { store, clock, ctx }
    }

    /// Community owned by `CREATOR` with `ADMIN` promoted and `MEMBER` joined
    pub async fn community(&self, public: bool) -> Community {
        let mut request = CreateCommunityRequest::new("rustaceans");
        if !public {
            request = request.private();
        }
        let community = CommunityService::new(&self.ctx)
            .create(CREATOR, request)
            .await
            .unwrap();
        let added = MembershipService::new(&self.ctx)
            .bulk_add(community.id, &[ADMIN, MEMBER], CREATOR)
            .await
            .unwrap();
        assert_eq!(added.applied_count(), 2);
        MembershipService::new(&self.ctx)
            .promote(community.id, ADMIN, CREATOR)
            .await
            .unwrap();
        CommunityService::new(&self.ctx).get(community.id).await.unwrap()
    }
}
