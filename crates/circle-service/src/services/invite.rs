//! Invite service
//!
//! Generates, resets, previews and redeems community invite codes. The
//! validity rule (not expired, usage below limit) is applied by the store at
//! redemption time so two users can never both take the last use.

use chrono::{DateTime, Duration, Utc};
use circle_core::entities::{is_well_formed_invite_code, normalize_invite_code};
use circle_core::{generate_invite_code, DomainError, InviteCode, Snowflake};
use serde::Serialize;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::dto::GenerateInviteRequest;

use super::context::ServiceContext;
use super::error::ServiceResult;
use super::permission::PermissionService;

/// Fresh codes are retried this many times on a collision with another community
const MAX_CODE_ATTEMPTS: usize = 5;

/// Read-only view of an invite, as shown before joining
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvitePreview {
    pub code: String,
    pub community_id: Snowflake,
    pub community_name: String,
    pub members_count: i64,
    /// `None` for unlimited codes
    pub remaining_uses: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Invite service
pub struct InviteService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> InviteService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Current code if it is still valid, otherwise a new one
    #[instrument(skip(self, request))]
    pub async fn generate(
        &self,
        community_id: Snowflake,
        admin_id: Snowflake,
        request: GenerateInviteRequest,
    ) -> ServiceResult<InviteCode> {
        request.validate()?;
        let community = PermissionService::new(self.ctx)
            .require_admin(community_id, admin_id)
            .await?;

        if let Some(current) = community.invite.filter(|i| i.is_valid(self.ctx.now())) {
            return Ok(current);
        }
        self.issue(community_id, admin_id, &request).await
    }

    /// Always issues a new code; the previous one stops working immediately
    #[instrument(skip(self, request))]
    pub async fn reset(
        &self,
        community_id: Snowflake,
        admin_id: Snowflake,
        request: GenerateInviteRequest,
    ) -> ServiceResult<InviteCode> {
        request.validate()?;
        PermissionService::new(self.ctx)
            .require_admin(community_id, admin_id)
            .await?;
        self.issue(community_id, admin_id, &request).await
    }

    #[instrument(skip(self))]
    pub async fn revoke(&self, community_id: Snowflake, admin_id: Snowflake) -> ServiceResult<()> {
        PermissionService::new(self.ctx)
            .require_admin(community_id, admin_id)
            .await?;
        self.ctx
            .store(self.ctx.community_repo().set_invite(community_id, None))
            .await?;
        info!(community_id = %community_id, admin_id = %admin_id, "Invite revoked");
        Ok(())
    }

    /// Preview without consuming a use
    #[instrument(skip(self))]
    pub async fn describe(&self, code: &str) -> ServiceResult<InvitePreview> {
        if !is_well_formed_invite_code(&normalize_invite_code(code)) {
            return Err(DomainError::InvalidInviteCode.into());
        }
        let community = self
            .ctx
            .store(self.ctx.community_repo().find_by_invite_code(code))
            .await?
            .filter(|c| !c.is_deleted())
            .ok_or(DomainError::InvalidInviteCode)?;
        let invite = community
            .invite
            .as_ref()
            .filter(|i| i.matches(code))
            .ok_or(DomainError::InvalidInviteCode)?;
        invite.check_redeemable(self.ctx.now())?;

        Ok(InvitePreview {
            code: invite.code.clone(),
            community_id: community.id,
            community_name: community.name.clone(),
            members_count: community.members_count,
            remaining_uses: invite.remaining_uses(),
            expires_at: invite.expires_at,
        })
    }

    /// Join through a code; returns the community joined
    #[instrument(skip(self))]
    pub async fn redeem(&self, code: &str, user_id: Snowflake) -> ServiceResult<Snowflake> {
        if !is_well_formed_invite_code(&normalize_invite_code(code)) {
            return Err(DomainError::InvalidInviteCode.into());
        }
        let community = self
            .ctx
            .store(
                self.ctx
                    .community_repo()
                    .redeem_invite(code, user_id, self.ctx.now()),
            )
            .await?;

        info!(
            community_id = %community.id,
            user_id = %user_id,
            code = %normalize_invite_code(code),
            "Invite redeemed"
        );
        Ok(community.id)
    }

    async fn issue(
        &self,
        community_id: Snowflake,
        admin_id: Snowflake,
        request: &GenerateInviteRequest,
    ) -> ServiceResult<InviteCode> {
        let defaults = &self.ctx.config().invites;
        let lifetime = request
            .expiry_minutes
            .and_then(Duration::try_minutes)
            .or_else(|| defaults.default_expiry());
        let usage_limit = request.usage_limit.unwrap_or(defaults.default_usage_limit);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut invite =
                InviteCode::new(generate_invite_code(), community_id, admin_id, self.ctx.now())
                    .with_usage_limit(usage_limit);
            if let Some(lifetime) = lifetime {
                invite = invite.with_expiry(lifetime);
            }

            match self
                .ctx
                .store(self.ctx.community_repo().set_invite(community_id, Some(&invite)))
                .await
            {
                Ok(()) => {
                    info!(
                        community_id = %community_id,
                        admin_id = %admin_id,
                        code = %invite.code,
                        usage_limit,
                        "Invite code issued"
                    );
                    return Ok(invite);
                }
                Err(e) => {
                    let collided = e.is_retryable()
                        && attempt < MAX_CODE_ATTEMPTS
                        && self.code_taken(&invite).await;
                    if !collided {
                        return Err(e);
                    }
                    warn!(code = %invite.code, attempt, "Invite code collision, retrying");
                }
            }
        }
    }

    async fn code_taken(&self, invite: &InviteCode) -> bool {
        matches!(
            self.ctx
                .store(self.ctx.community_repo().find_by_invite_code(&invite.code))
                .await,
            Ok(Some(owner)) if owner.id != invite.community_id
        )
    }
}
