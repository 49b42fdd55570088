//! Identity & role resolver.
//!
//! Everything here is a pure function of a [`Community`] snapshot. Callers
//! re-read the community right before mutating so decisions are never based
//! on a snapshot cached across calls.

use chrono::{DateTime, Utc};

use crate::entities::Community;
use crate::error::DomainError;
use crate::value_objects::Snowflake;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberRole {
    Creator,
    Admin,
    Member,
    Banned,
    None,
}

impl MemberRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Creator => "CREATOR",
            Self::Admin => "ADMIN",
            Self::Member => "MEMBER",
            Self::Banned => "BANNED",
            Self::None => "NONE",
        }
    }

    #[inline]
    pub fn is_admin_like(self) -> bool {
        matches!(self, Self::Creator | Self::Admin)
    }

    #[inline]
    pub fn is_member_like(self) -> bool {
        matches!(self, Self::Creator | Self::Admin | Self::Member)
    }
}

/// Total over any input; an unset id resolves to `None`
pub fn role_of(community: &Community, user_id: Snowflake) -> MemberRole {
    if user_id.is_zero() {
        MemberRole::None
    } else if community.is_banned(user_id) {
        MemberRole::Banned
    } else if community.is_creator(user_id) {
        MemberRole::Creator
    } else if !community.is_member(user_id) {
        MemberRole::None
    } else if community.is_admin(user_id) {
        MemberRole::Admin
    } else {
        MemberRole::Member
    }
}

pub fn is_authorized_admin(community: &Community, user_id: Snowflake) -> bool {
    role_of(community, user_id).is_admin_like()
}

/// Muting is an overlay on membership, not a role of its own
pub fn is_muted(community: &Community, user_id: Snowflake, now: DateTime<Utc>) -> bool {
    community.active_mute(user_id, now).is_some()
}

/// Ban/mute authorization: the creator may act on anyone but themselves,
/// other admins only on plain members.
pub fn can_moderate(
    community: &Community,
    actor_id: Snowflake,
    target_id: Snowflake,
) -> Result<(), DomainError> {
    let actor = role_of(community, actor_id);
    if !actor.is_admin_like() {
        return Err(DomainError::NotAuthorized("admin role required".into()));
    }
    if actor_id == target_id {
        return Err(DomainError::CannotModerateSelf);
    }
    if community.is_creator(target_id) {
        return Err(DomainError::CannotModerateCreator);
    }
    if actor != MemberRole::Creator && role_of(community, target_id) == MemberRole::Admin {
        return Err(DomainError::NotAuthorized(
            "only the creator can moderate another admin".into(),
        ));
    }
    Ok(())
}
