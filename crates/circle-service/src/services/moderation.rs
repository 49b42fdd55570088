//! Moderation service
//!
//! Bans and mutes. The creator may moderate anyone but themselves; other
//! admins may moderate plain members only.

use chrono::Duration;
use circle_core::{can_moderate, is_muted, BanRecord, DomainError, MuteRecord, Snowflake};
use tracing::{info, instrument};
use validator::Validate;

use crate::dto::{BanRequest, MuteRequest};

use super::context::ServiceContext;
use super::error::ServiceResult;
use super::notification::NotificationDispatcher;
use super::permission::PermissionService;

/// Moderation service
pub struct ModerationService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> ModerationService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Evicts the target from members and admins and blocks re-joining
    #[instrument(skip(self, request))]
    pub async fn ban(
        &self,
        community_id: Snowflake,
        target_id: Snowflake,
        actor_id: Snowflake,
        request: BanRequest,
    ) -> ServiceResult<BanRecord> {
        request.validate()?;
        let community = PermissionService::new(self.ctx)
            .live_community(community_id)
            .await?;
        can_moderate(&community, actor_id, target_id)?;

        let ban = BanRecord::new(target_id, actor_id, self.ctx.now(), request.reason);
        self.ctx
            .store(self.ctx.community_repo().add_ban(community_id, &ban))
            .await?;

        info!(
            community_id = %community_id,
            target_id = %target_id,
            actor_id = %actor_id,
            "User banned"
        );

        NotificationDispatcher::new(self.ctx)
            .banned(&community, target_id, ban.reason.as_deref())
            .await;
        Ok(ban)
    }

    #[instrument(skip(self))]
    pub async fn unban(
        &self,
        community_id: Snowflake,
        target_id: Snowflake,
        admin_id: Snowflake,
    ) -> ServiceResult<()> {
        PermissionService::new(self.ctx)
            .require_admin(community_id, admin_id)
            .await?;
        let lifted = self
            .ctx
            .store(self.ctx.community_repo().remove_ban(community_id, target_id))
            .await?;
        if !lifted {
            return Err(DomainError::NoSuchBan(target_id).into());
        }
        info!(community_id = %community_id, target_id = %target_id, admin_id = %admin_id, "User unbanned");
        Ok(())
    }

    /// Time-bounded posting restriction; the target stays a member
    #[instrument(skip(self, request))]
    pub async fn mute(
        &self,
        community_id: Snowflake,
        target_id: Snowflake,
        actor_id: Snowflake,
        request: MuteRequest,
    ) -> ServiceResult<MuteRecord> {
        request.validate()?;
        let max = self.ctx.config().moderation.max_mute_minutes;
        if request.duration_minutes <= 0 || request.duration_minutes > max {
            return Err(DomainError::InvalidMuteDuration { max }.into());
        }

        let community = PermissionService::new(self.ctx)
            .live_community(community_id)
            .await?;
        can_moderate(&community, actor_id, target_id)?;
        if !community.is_member(target_id) {
            return Err(DomainError::NotMember(target_id).into());
        }

        let mute = MuteRecord::new(
            target_id,
            actor_id,
            self.ctx.now(),
            Duration::try_minutes(request.duration_minutes)
                .ok_or(DomainError::InvalidMuteDuration { max })?,
            request.reason,
        );
        self.ctx
            .store(self.ctx.community_repo().add_mute(community_id, &mute))
            .await?;

        info!(
            community_id = %community_id,
            target_id = %target_id,
            actor_id = %actor_id,
            minutes = request.duration_minutes,
            "User muted"
        );

        NotificationDispatcher::new(self.ctx)
            .muted(&community, target_id, request.duration_minutes)
            .await;
        Ok(mute)
    }

    #[instrument(skip(self))]
    pub async fn unmute(
        &self,
        community_id: Snowflake,
        target_id: Snowflake,
        admin_id: Snowflake,
    ) -> ServiceResult<()> {
        PermissionService::new(self.ctx)
            .require_admin(community_id, admin_id)
            .await?;
        let lifted = self
            .ctx
            .store(self.ctx.community_repo().remove_mute(community_id, target_id))
            .await?;
        if !lifted {
            return Err(DomainError::NoSuchMute(target_id).into());
        }
        info!(community_id = %community_id, target_id = %target_id, admin_id = %admin_id, "User unmuted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn bans(&self, community_id: Snowflake, admin_id: Snowflake) -> ServiceResult<Vec<BanRecord>> {
        let community = PermissionService::new(self.ctx)
            .require_admin(community_id, admin_id)
            .await?;
        Ok(community.bans)
    }

    /// Mutes that have not lapsed yet
    #[instrument(skip(self))]
    pub async fn active_mutes(
        &self,
        community_id: Snowflake,
        admin_id: Snowflake,
    ) -> ServiceResult<Vec<MuteRecord>> {
        let community = PermissionService::new(self.ctx)
            .require_admin(community_id, admin_id)
            .await?;
        let now = self.ctx.now();
        Ok(community
            .mutes
            .into_iter()
            .filter(|m| m.is_active(now))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn is_muted(&self, community_id: Snowflake, user_id: Snowflake) -> ServiceResult<bool> {
        let community = PermissionService::new(self.ctx)
            .live_community(community_id)
            .await?;
        Ok(is_muted(&community, user_id, self.ctx.now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::membership::MembershipService;
    use crate::services::test_support::{Harness, ADMIN, CREATOR, MEMBER, OUTSIDER};
    use circle_common::EngineConfig;

    #[tokio::test]
    async fn test_ban_evicts_and_unban_lifts() {
        let h = Harness::new();
        let community = h.community(true).await;
        let service = ModerationService::new(&h.ctx);

        let ban = service
            .ban(community.id, MEMBER, ADMIN, BanRequest { reason: Some("spam".into()) })
            .await
            .unwrap();
        assert_eq!(ban.moderator_id, ADMIN);

        let community = PermissionService::new(&h.ctx)
            .live_community(community.id)
            .await
            .unwrap();
        assert!(!community.is_member(MEMBER));
        assert!(community.is_banned(MEMBER));
        let bans = service.bans(community.id, ADMIN).await.unwrap();
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].user_id, MEMBER);

        service.unban(community.id, MEMBER, ADMIN).await.unwrap();
        assert!(service.bans(community.id, ADMIN).await.unwrap().is_empty());
        let err = service.unban(community.id, MEMBER, ADMIN).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NoSuchBan(_))));

        MembershipService::new(&h.ctx)
            .join(community.id, MEMBER)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_moderation_hierarchy() {
        let h = Harness::new();
        let community = h.community(true).await;
        let service = ModerationService::new(&h.ctx);

        let err = service
            .ban(community.id, CREATOR, ADMIN, BanRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::CannotModerateCreator)));

        let err = service
            .ban(community.id, ADMIN, MEMBER, BanRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotAuthorized(_))));

        let err = service
            .mute(community.id, ADMIN, ADMIN, MuteRequest::minutes(5))
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::CannotModerateSelf)));

        // the creator outranks delegated admins
        service
            .mute(community.id, ADMIN, CREATOR, MuteRequest::minutes(5))
            .await
            .unwrap();
        assert!(service.is_muted(community.id, ADMIN).await.unwrap());
    }

    #[tokio::test]
    async fn test_mute_duration_bounds() {
        let h = Harness::new();
        let community = h.community(true).await;
        let service = ModerationService::new(&h.ctx);
        let max = h.ctx.config().moderation.max_mute_minutes;

        for minutes in [0, -5, max + 1] {
            let err = service
                .mute(community.id, MEMBER, ADMIN, MuteRequest::minutes(minutes))
                .await
                .unwrap_err();
            assert!(matches!(err.domain(), Some(DomainError::InvalidMuteDuration { .. })));
        }

        let err = service
            .mute(community.id, OUTSIDER, ADMIN, MuteRequest::minutes(5))
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotMember(_))));
    }

    #[tokio::test]
    async fn test_mutes_lapse_on_their_own() {
        let h = Harness::new();
        let community = h.community(true).await;
        let service = ModerationService::new(&h.ctx);
        service
            .mute(community.id, MEMBER, ADMIN, MuteRequest::minutes(10))
            .await
            .unwrap();
        assert_eq!(service.active_mutes(community.id, ADMIN).await.unwrap().len(), 1);

        h.clock.advance(Duration::minutes(11));
        assert!(!service.is_muted(community.id, MEMBER).await.unwrap());
        assert!(service.active_mutes(community.id, ADMIN).await.unwrap().is_empty());

        let err = service.unmute(community.id, OUTSIDER, ADMIN).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NoSuchMute(_))));
    }

    #[tokio::test]
    async fn test_oversized_mute_is_rejected_not_overflowed() {
        let mut config = EngineConfig::default();
        config.moderation.max_mute_minutes = i64::MAX;
        let h = Harness::with_config(config);
        let community = h.community(true).await;

        let err = ModerationService::new(&h.ctx)
            .mute(community.id, MEMBER, ADMIN, MuteRequest::minutes(i64::MAX / 2))
            .await
            .unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(DomainError::InvalidMuteDuration { .. })
        ));
    }
}
