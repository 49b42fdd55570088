//! Community service
//!
//! Community lifecycle: creation, details, settings and soft deletion.

use circle_core::{Community, Deletion, DomainError, LockFlags, Snowflake};
use tracing::{info, instrument};
use validator::Validate;

use crate::dto::{CreateCommunityRequest, UpdateCommunityRequest, UpdateSettingsRequest};

use super::context::ServiceContext;
use super::error::ServiceResult;
use super::permission::PermissionService;

/// Community service
pub struct CommunityService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> CommunityService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// The creator starts as the only member and admin
    #[instrument(skip(self, request))]
    pub async fn create(
        &self,
        creator_id: Snowflake,
        request: CreateCommunityRequest,
    ) -> ServiceResult<Community> {
        request.validate()?;

        let community = Community::new(
            self.ctx.generate_id(),
            creator_id,
            request.name.trim().to_string(),
            self.ctx.now(),
        )
        .with_description(request.description.clone().unwrap_or_default())
        .with_category(request.category())
        .with_visibility(request.is_public)
        .with_tags(request.tags())
        .with_photo(request.photo_url.clone());

        self.ctx
            .store(self.ctx.community_repo().create(&community))
            .await?;

        info!(
            community_id = %community.id,
            creator_id = %creator_id,
            is_public = community.is_public,
            "Community created"
        );
        Ok(community)
    }

    /// Soft-deleted communities read as not found
    #[instrument(skip(self))]
    pub async fn get(&self, community_id: Snowflake) -> ServiceResult<Community> {
        PermissionService::new(self.ctx)
            .live_community(community_id)
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: Snowflake) -> ServiceResult<Vec<Community>> {
        self.ctx
            .store(self.ctx.community_repo().find_by_member(user_id))
            .await
    }

    /// Admins edit details; locked fields are left to the creator
    #[instrument(skip(self, request))]
    pub async fn update_details(
        &self,
        community_id: Snowflake,
        actor_id: Snowflake,
        request: UpdateCommunityRequest,
    ) -> ServiceResult<Community> {
        request.validate()?;
        let community = PermissionService::new(self.ctx)
            .require_admin(community_id, actor_id)
            .await?;

        let patch = request.into_patch();
        if patch.is_empty() {
            return Ok(community);
        }
        if !community.is_creator(actor_id) {
            let blocked = patch.touched_locks() & community.settings.locks;
            if let Some(field) = locked_field_name(blocked) {
                return Err(DomainError::FieldLocked(field).into());
            }
        }

        let updated = self
            .ctx
            .store(self.ctx.community_repo().update_details(community_id, &patch))
            .await?;

        info!(community_id = %community_id, actor_id = %actor_id, "Community details updated");
        Ok(updated)
    }

    /// Admins change settings; only the creator changes lock flags
    #[instrument(skip(self, request))]
    pub async fn update_settings(
        &self,
        community_id: Snowflake,
        actor_id: Snowflake,
        request: UpdateSettingsRequest,
    ) -> ServiceResult<Community> {
        request.validate()?;
        let community = PermissionService::new(self.ctx)
            .require_admin(community_id, actor_id)
            .await?;

        let (permissions, settings) = request.apply(community.permissions, &community.settings);
        if settings.locks != community.settings.locks && !community.is_creator(actor_id) {
            return Err(DomainError::NotAuthorized("only the creator may change locks".into()).into());
        }

        let updated = self
            .ctx
            .store(
                self.ctx
                    .community_repo()
                    .update_settings(community_id, permissions, &settings),
            )
            .await?;

        info!(community_id = %community_id, actor_id = %actor_id, "Community settings updated");
        Ok(updated)
    }

    /// Creator only; the community is kept and marked deleted
    #[instrument(skip(self))]
    pub async fn delete(&self, community_id: Snowflake, actor_id: Snowflake) -> ServiceResult<()> {
        PermissionService::new(self.ctx)
            .require_creator(community_id, actor_id)
            .await?;

        let deletion = Deletion {
            deleted_by: actor_id,
            deleted_at: self.ctx.now(),
        };
        self.ctx
            .store(self.ctx.community_repo().soft_delete(community_id, deletion))
            .await?;

        info!(community_id = %community_id, actor_id = %actor_id, "Community deleted");
        Ok(())
    }
}

fn locked_field_name(blocked: LockFlags) -> Option<&'static str> {
    if blocked.contains(LockFlags::NAME) {
        Some("name")
    } else if blocked.contains(LockFlags::DESCRIPTION) {
        Some("description")
    } else if blocked.contains(LockFlags::PHOTO) {
        Some("photo")
    } else {
        None
    }
}
