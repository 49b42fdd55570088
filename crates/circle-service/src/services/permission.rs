//! Permission service
//!
//! Loads a fresh community snapshot for every check and applies the role
//! resolver to it. Nothing is cached between calls.

use circle_core::{
    is_authorized_admin, role_of, Community, DomainError, MemberRole, Snowflake,
};

use super::context::ServiceContext;
use super::error::ServiceResult;

/// Permission service
pub struct PermissionService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> PermissionService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Community by id; soft-deleted communities read as not found
    pub async fn live_community(&self, community_id: Snowflake) -> ServiceResult<Community> {
        let community = self
            .ctx
            .store(self.ctx.community_repo().find_by_id(community_id))
            .await?
            .filter(|c| !c.is_deleted())
            .ok_or(DomainError::CommunityNotFound(community_id))?;
        Ok(community)
    }

    pub async fn role(&self, community_id: Snowflake, user_id: Snowflake) -> ServiceResult<MemberRole> {
        let community = self.live_community(community_id).await?;
        Ok(role_of(&community, user_id))
    }

    /// Community snapshot, provided `user_id` is its creator or an admin
    pub async fn require_admin(
        &self,
        community_id: Snowflake,
        user_id: Snowflake,
    ) -> ServiceResult<Community> {
        let community = self.live_community(community_id).await?;
        ensure_admin(&community, user_id)?;
        Ok(community)
    }

    pub async fn require_creator(
        &self,
        community_id: Snowflake,
        user_id: Snowflake,
    ) -> ServiceResult<Community> {
        let community = self.live_community(community_id).await?;
        if !community.is_creator(user_id) {
            return Err(DomainError::NotAuthorized("only the creator may do this".into()).into());
        }
        Ok(community)
    }

    pub async fn require_member(
        &self,
        community_id: Snowflake,
        user_id: Snowflake,
    ) -> ServiceResult<Community> {
        let community = self.live_community(community_id).await?;
        ensure_member(&community, user_id)?;
        Ok(community)
    }
}

pub(crate) fn ensure_admin(community: &Community, user_id: Snowflake) -> Result<(), DomainError> {
    if is_authorized_admin(community, user_id) {
        Ok(())
    } else {
        Err(DomainError::NotAuthorized("admin role required".into()))
    }
}

pub(crate) fn ensure_member(community: &Community, user_id: Snowflake) -> Result<(), DomainError> {
    match role_of(community, user_id) {
        MemberRole::Banned => Err(DomainError::UserBanned),
        MemberRole::None => Err(DomainError::NotMember(user_id)),
        _ => Ok(()),
    }
}
