//! Membership service
//!
//! Joining, leaving, join-request approval, admin promotion and bulk
//! operations. Every check runs against a snapshot read just before the
//! atomic store call that performs the change.

use std::collections::BTreeSet;

use circle_core::{role_of, DomainError, JoinRequest, MemberRole, Snowflake};
use serde::Serialize;
use tracing::{info, instrument};

use super::context::ServiceContext;
use super::error::ServiceResult;
use super::notification::NotificationDispatcher;
use super::permission::{ensure_admin, PermissionService};

/// Result of [`MembershipService::join`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOutcome {
    /// Added to members directly
    Joined,
    /// Waiting for an admin to approve
    Requested,
}

/// Ids acted on by a bulk operation and how many candidates were skipped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub applied: Vec<Snowflake>,
    pub skipped: usize,
}

impl BulkOutcome {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

/// Membership service
pub struct MembershipService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> MembershipService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    fn permissions(&self) -> PermissionService<'a> {
        PermissionService::new(self.ctx)
    }

    fn notifier(&self) -> NotificationDispatcher<'a> {
        NotificationDispatcher::new(self.ctx)
    }

    /// Public communities admit directly; private ones (or those requiring
    /// approval) record a join request and notify the admins
    #[instrument(skip(self))]
    pub async fn join(&self, community_id: Snowflake, user_id: Snowflake) -> ServiceResult<JoinOutcome> {
        let community = self.permissions().live_community(community_id).await?;
        match role_of(&community, user_id) {
            MemberRole::Banned => return Err(DomainError::UserBanned.into()),
            MemberRole::None => {}
            _ => return Err(DomainError::AlreadyMember.into()),
        }
        if community.pending_request(user_id).is_some() {
            return Err(DomainError::AlreadyRequested.into());
        }

        if !community.requires_approval() {
            let added = self
                .ctx
                .store(self.ctx.community_repo().add_member(community_id, user_id))
                .await?;
            if !added {
                return Err(DomainError::AlreadyMember.into());
            }
            info!(community_id = %community_id, user_id = %user_id, "Member joined");
            return Ok(JoinOutcome::Joined);
        }

        let request = JoinRequest::new(user_id, self.ctx.now());
        let pushed = self
            .ctx
            .store(self.ctx.community_repo().add_join_request(community_id, request))
            .await?;
        if !pushed {
            return Err(DomainError::AlreadyRequested.into());
        }
        info!(community_id = %community_id, user_id = %user_id, "Join requested");

        self.notifier().join_requested(&community, user_id).await;
        Ok(JoinOutcome::Requested)
    }

    #[instrument(skip(self))]
    pub async fn cancel_request(&self, community_id: Snowflake, user_id: Snowflake) -> ServiceResult<()> {
        self.permissions().live_community(community_id).await?;
        let dropped = self
            .ctx
            .store(self.ctx.community_repo().remove_join_request(community_id, user_id))
            .await?;
        if !dropped {
            return Err(DomainError::NoSuchRequest(user_id).into());
        }
        info!(community_id = %community_id, user_id = %user_id, "Join request cancelled");
        Ok(())
    }

    /// Oldest first
    #[instrument(skip(self))]
    pub async fn pending_requests(
        &self,
        community_id: Snowflake,
        admin_id: Snowflake,
    ) -> ServiceResult<Vec<JoinRequest>> {
        let community = self.permissions().require_admin(community_id, admin_id).await?;
        let mut requests = community.join_requests;
        requests.sort_by_key(|r| r.requested_at);
        Ok(requests)
    }

    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        community_id: Snowflake,
        user_id: Snowflake,
        admin_id: Snowflake,
    ) -> ServiceResult<()> {
        let community = self.permissions().require_admin(community_id, admin_id).await?;
        let approved = self
            .ctx
            .store(self.ctx.community_repo().approve_join_request(community_id, user_id))
            .await?;
        if !approved {
            return Err(DomainError::NoSuchRequest(user_id).into());
        }
        info!(community_id = %community_id, user_id = %user_id, admin_id = %admin_id, "Join request approved");

        self.notifier().join_approved(&community, user_id).await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn reject(
        &self,
        community_id: Snowflake,
        user_id: Snowflake,
        admin_id: Snowflake,
    ) -> ServiceResult<()> {
        let community = self.permissions().require_admin(community_id, admin_id).await?;
        let dropped = self
            .ctx
            .store(self.ctx.community_repo().remove_join_request(community_id, user_id))
            .await?;
        if !dropped {
            return Err(DomainError::NoSuchRequest(user_id).into());
        }
        info!(community_id = %community_id, user_id = %user_id, admin_id = %admin_id, "Join request rejected");

        self.notifier().join_rejected(&community, user_id).await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn leave(&self, community_id: Snowflake, user_id: Snowflake) -> ServiceResult<()> {
        let community = self.permissions().live_community(community_id).await?;
        if community.is_creator(user_id) {
            return Err(DomainError::CreatorCannotLeave.into());
        }
        if !community.is_member(user_id) {
            return Err(DomainError::NotMember(user_id).into());
        }
        self.ctx
            .store(self.ctx.community_repo().remove_member(community_id, user_id))
            .await?;
        info!(community_id = %community_id, user_id = %user_id, "Member left");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_member(
        &self,
        community_id: Snowflake,
        target_id: Snowflake,
        admin_id: Snowflake,
    ) -> ServiceResult<()> {
        let community = self.permissions().require_admin(community_id, admin_id).await?;
        if community.is_creator(target_id) {
            return Err(DomainError::CannotRemoveCreator.into());
        }
        if !community.is_member(target_id) {
            return Err(DomainError::NotMember(target_id).into());
        }
        self.ctx
            .store(self.ctx.community_repo().remove_member(community_id, target_id))
            .await?;
        info!(community_id = %community_id, target_id = %target_id, admin_id = %admin_id, "Member removed");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn promote(
        &self,
        community_id: Snowflake,
        target_id: Snowflake,
        admin_id: Snowflake,
    ) -> ServiceResult<()> {
        let community = self.permissions().require_admin(community_id, admin_id).await?;
        match role_of(&community, target_id) {
            MemberRole::Member => {}
            MemberRole::Creator | MemberRole::Admin => return Err(DomainError::AlreadyAdmin.into()),
            MemberRole::Banned | MemberRole::None => {
                return Err(DomainError::NotMember(target_id).into())
            }
        }
        self.ctx
            .store(self.ctx.community_repo().add_admin(community_id, target_id))
            .await?;
        info!(community_id = %community_id, target_id = %target_id, admin_id = %admin_id, "Member promoted");

        self.notifier().promoted(&community, target_id).await;
        Ok(())
    }

    /// A delegated admin may step down only while another delegated admin remains
    #[instrument(skip(self))]
    pub async fn demote(
        &self,
        community_id: Snowflake,
        target_id: Snowflake,
        admin_id: Snowflake,
    ) -> ServiceResult<()> {
        let community = self.permissions().require_admin(community_id, admin_id).await?;
        if community.is_creator(target_id) {
            return Err(DomainError::CannotDemoteCreator.into());
        }
        if !community.is_admin(target_id) {
            return Err(DomainError::NotAdmin.into());
        }
        if target_id == admin_id && community.delegated_admins() <= 1 {
            return Err(DomainError::LastAdminRequired.into());
        }
        self.ctx
            .store(self.ctx.community_repo().remove_admin(community_id, target_id))
            .await?;
        info!(community_id = %community_id, target_id = %target_id, admin_id = %admin_id, "Admin demoted");
        Ok(())
    }

    /// Admins, or any member when the community lets members add people.
    /// Existing members, banned users and duplicates are skipped.
    #[instrument(skip(self, candidate_ids), fields(candidates = candidate_ids.len()))]
    pub async fn bulk_add(
        &self,
        community_id: Snowflake,
        candidate_ids: &[Snowflake],
        actor_id: Snowflake,
    ) -> ServiceResult<BulkOutcome> {
        let community = self.permissions().live_community(community_id).await?;
        if !(community.settings.members_can_add
            && role_of(&community, actor_id).is_member_like())
        {
            ensure_admin(&community, actor_id)?;
        }

        let mut seen = BTreeSet::new();
        let eligible: Vec<Snowflake> = candidate_ids
            .iter()
            .copied()
            .filter(|id| {
                !id.is_zero()
                    && seen.insert(*id)
                    && !community.is_member(*id)
                    && !community.is_banned(*id)
            })
            .collect();

        let applied = if eligible.is_empty() {
            Vec::new()
        } else {
            self.ctx
                .store(self.ctx.community_repo().add_members(community_id, &eligible))
                .await?
        };
        let outcome = BulkOutcome {
            skipped: candidate_ids.len() - applied.len(),
            applied,
        };
        info!(
            community_id = %community_id,
            actor_id = %actor_id,
            added = outcome.applied.len(),
            skipped = outcome.skipped,
            "Members added"
        );

        if !outcome.applied.is_empty() {
            self.notifier()
                .added(&community, &outcome.applied, actor_id)
                .await;
        }
        Ok(outcome)
    }

    /// Promotes the candidates that are members but not yet admins
    #[instrument(skip(self, candidate_ids), fields(candidates = candidate_ids.len()))]
    pub async fn bulk_promote(
        &self,
        community_id: Snowflake,
        candidate_ids: &[Snowflake],
        admin_id: Snowflake,
    ) -> ServiceResult<BulkOutcome> {
        let community = self.permissions().require_admin(community_id, admin_id).await?;

        let mut seen = BTreeSet::new();
        let mut applied = Vec::new();
        for id in candidate_ids.iter().copied() {
            if !seen.insert(id) || role_of(&community, id) != MemberRole::Member {
                continue;
            }
            match self
                .ctx
                .store(self.ctx.community_repo().add_admin(community_id, id))
                .await
            {
                Ok(true) => applied.push(id),
                Ok(false) => {}
                // left between the snapshot and the write
                Err(e) if matches!(e.domain(), Some(DomainError::NotMember(_))) => {}
                Err(e) => return Err(e),
            }
        }
        let outcome = BulkOutcome {
            skipped: candidate_ids.len() - applied.len(),
            applied,
        };
        info!(
            community_id = %community_id,
            admin_id = %admin_id,
            promoted = outcome.applied.len(),
            skipped = outcome.skipped,
            "Members promoted"
        );

        for id in &outcome.applied {
            self.notifier().promoted(&community, *id).await;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::BanRequest;
    use crate::services::moderation::ModerationService;
    use crate::services::test_support::{Harness, ADMIN, CREATOR, MEMBER, OUTSIDER};
    use circle_core::{CommunityRepository, NotificationKind, NotificationRepository};

    #[tokio::test]
    async fn test_public_join_is_immediate() {
        let h = Harness::new();
        let community = h.community(true).await;
        let service = MembershipService::new(&h.ctx);

        let outcome = service.join(community.id, OUTSIDER).await.unwrap();
        assert_eq!(outcome, JoinOutcome::Joined);

        let err = service.join(community.id, OUTSIDER).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::AlreadyMember)));
    }

    #[tokio::test]
    async fn test_private_join_waits_for_approval() {
        let h = Harness::new();
        let community = h.community(false).await;
        let service = MembershipService::new(&h.ctx);

        let outcome = service.join(community.id, OUTSIDER).await.unwrap();
        assert_eq!(outcome, JoinOutcome::Requested);
        let err = service.join(community.id, OUTSIDER).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::AlreadyRequested)));

        // both moderators hear about it
        for admin in [CREATOR, ADMIN] {
            let inbox = h.store.notifications.find_by_user(admin, true, 10).await.unwrap();
            assert_eq!(inbox.len(), 1);
            assert_eq!(inbox[0].kind, NotificationKind::JoinRequest);
        }

        let err = service.approve(community.id, OUTSIDER, MEMBER).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotAuthorized(_))));

        service.approve(community.id, OUTSIDER, ADMIN).await.unwrap();
        let community = h.store.communities.find_by_id(community.id).await.unwrap().unwrap();
        assert!(community.is_member(OUTSIDER));
        assert!(community.join_requests.is_empty());
        assert_eq!(community.members_count, 4);
    }

    #[tokio::test]
    async fn test_banned_user_cannot_join() {
        let h = Harness::new();
        let community = h.community(true).await;
        ModerationService::new(&h.ctx)
            .ban(community.id, MEMBER, CREATOR, BanRequest::default())
            .await
            .unwrap();

        let err = MembershipService::new(&h.ctx)
            .join(community.id, MEMBER)
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::UserBanned)));
    }

    #[tokio::test]
    async fn test_creator_cannot_leave() {
        let h = Harness::new();
        let community = h.community(true).await;
        let service = MembershipService::new(&h.ctx);

        let err = service.leave(community.id, CREATOR).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::CreatorCannotLeave)));

        service.leave(community.id, ADMIN).await.unwrap();
        let community = h.store.communities.find_by_id(community.id).await.unwrap().unwrap();
        assert!(!community.is_member(ADMIN));
        assert!(!community.is_admin(ADMIN));
    }

    #[tokio::test]
    async fn test_last_delegated_admin_cannot_step_down() {
        let h = Harness::new();
        let community = h.community(true).await;
        let service = MembershipService::new(&h.ctx);

        let err = service.demote(community.id, ADMIN, ADMIN).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::LastAdminRequired)));

        let err = service.demote(community.id, CREATOR, ADMIN).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::CannotDemoteCreator)));

        service.demote(community.id, ADMIN, CREATOR).await.unwrap();
        let role = PermissionService::new(&h.ctx).role(community.id, ADMIN).await.unwrap();
        assert_eq!(role, MemberRole::Member);
    }

    #[tokio::test]
    async fn test_bulk_add_skips_members_banned_and_duplicates() {
        let h = Harness::new();
        let community = h.community(true).await;
        let banned = Snowflake::new(20);
        let service = MembershipService::new(&h.ctx);
        service.join(community.id, banned).await.unwrap();
        ModerationService::new(&h.ctx)
            .ban(community.id, banned, CREATOR, BanRequest::default())
            .await
            .unwrap();

        let fresh = Snowflake::new(21);
        let outcome = service
            .bulk_add(community.id, &[fresh, fresh, MEMBER, banned, Snowflake::new(0)], ADMIN)
            .await
            .unwrap();
        assert_eq!(outcome.applied, vec![fresh]);
        assert_eq!(outcome.skipped, 4);

        let err = service
            .bulk_add(community.id, &[Snowflake::new(22)], MEMBER)
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn test_bulk_promote_only_plain_members() {
        let h = Harness::new();
        let community = h.community(true).await;
        let outcome = MembershipService::new(&h.ctx)
            .bulk_promote(community.id, &[MEMBER, ADMIN, OUTSIDER], CREATOR)
            .await
            .unwrap();
        assert_eq!(outcome.applied, vec![MEMBER]);
        assert_eq!(outcome.skipped, 2);
    }

    #[tokio::test]
    async fn test_reject_drops_request_and_notifies() {
        let h = Harness::new();
        let community = h.community(false).await;
        let service = MembershipService::new(&h.ctx);
        service.join(community.id, OUTSIDER).await.unwrap();

        service.reject(community.id, OUTSIDER, ADMIN).await.unwrap();
        let stored = h.store.communities.find_by_id(community.id).await.unwrap().unwrap();
        assert!(stored.join_requests.is_empty());
        assert!(!stored.is_member(OUTSIDER));

        let inbox = h.store.notifications.find_by_user(OUTSIDER, true, 10).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::JoinRejected);

        let err = service.reject(community.id, OUTSIDER, ADMIN).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NoSuchRequest(id)) if *id == OUTSIDER));
    }

    #[tokio::test]
    async fn test_pending_requests_oldest_first() {
        let h = Harness::new();
        let community = h.community(false).await;
        let early = Snowflake::new(30);
        let late = Snowflake::new(31);
        let now = h.ctx.now();
        h.store
            .communities
            .add_join_request(community.id, JoinRequest::new(late, now))
            .await
            .unwrap();
        h.store
            .communities
            .add_join_request(community.id, JoinRequest::new(early, now - chrono::Duration::minutes(5)))
            .await
            .unwrap();

        let service = MembershipService::new(&h.ctx);
        let pending = service.pending_requests(community.id, ADMIN).await.unwrap();
        let order: Vec<_> = pending.iter().map(|r| r.user_id).collect();
        assert_eq!(order, vec![early, late]);

        let err = service.pending_requests(community.id, MEMBER).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn test_creator_cannot_be_removed() {
        let h = Harness::new();
        let community = h.community(true).await;
        let service = MembershipService::new(&h.ctx);

        let err = service.remove_member(community.id, CREATOR, ADMIN).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::CannotRemoveCreator)));

        service.remove_member(community.id, MEMBER, ADMIN).await.unwrap();
        let err = service.remove_member(community.id, MEMBER, ADMIN).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotMember(_))));
    }
}
