//! Presence service
//!
//! Online/offline state per user, stored through the presence port.

use circle_core::{Presence, Snowflake};
use tracing::{debug, instrument};

use super::context::ServiceContext;
use super::error::ServiceResult;

/// Presence service
pub struct PresenceService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> PresenceService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self))]
    pub async fn set_online(&self, user_id: Snowflake) -> ServiceResult<Presence> {
        self.update(Presence::online(user_id, self.ctx.now())).await
    }

    #[instrument(skip(self))]
    pub async fn set_offline(&self, user_id: Snowflake) -> ServiceResult<Presence> {
        self.update(Presence::offline(user_id, self.ctx.now())).await
    }

    /// `None` for users never seen
    pub async fn get(&self, user_id: Snowflake) -> ServiceResult<Option<Presence>> {
        self.ctx.store(self.ctx.presence_repo().get(user_id)).await
    }

    /// Presence of several users, skipping the ones never seen
    pub async fn get_many(&self, user_ids: &[Snowflake]) -> ServiceResult<Vec<Presence>> {
        let mut found = Vec::with_capacity(user_ids.len());
        for &user_id in user_ids {
            if let Some(presence) = self.get(user_id).await? {
                found.push(presence);
            }
        }
        Ok(found)
    }

    async fn update(&self, presence: Presence) -> ServiceResult<Presence> {
        self.ctx
            .store(self.ctx.presence_repo().set(&presence))
            .await?;
        debug!(user_id = %presence.user_id, online = presence.online, "Presence updated");
        Ok(presence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{Harness, ADMIN, MEMBER, OUTSIDER};

    #[tokio::test]
    async fn test_presence_round_trip() {
        let h = Harness::new();
        let service = PresenceService::new(&h.ctx);
        assert!(service.get(MEMBER).await.unwrap().is_none());

        service.set_online(MEMBER).await.unwrap();
        service.set_online(ADMIN).await.unwrap();
        h.clock.advance(chrono::Duration::minutes(3));
        let offline = service.set_offline(ADMIN).await.unwrap();
        assert!(!offline.online);
        assert_eq!(offline.last_seen, h.ctx.now());

        let seen = service.get_many(&[MEMBER, ADMIN, OUTSIDER]).await.unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].online);
        assert!(!seen[1].online);
    }
}
