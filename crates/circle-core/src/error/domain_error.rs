//! Domain errors - error types for the domain layer

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::entities::MessageStatus;
use crate::value_objects::Snowflake;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum DomainError {
    // =========================================================================
    // Not Found Errors
    // =========================================================================
    #[error("Community not found: {0}")]
    CommunityNotFound(Snowflake),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(Snowflake),

    #[error("User not found: {0}")]
    UserNotFound(Snowflake),

    #[error("No pending join request for user {0}")]
    NoSuchRequest(Snowflake),

    #[error("User {0} is not banned")]
    NoSuchBan(Snowflake),

    #[error("User {0} is not muted")]
    NoSuchMute(Snowflake),

    // =========================================================================
    // Authorization Errors
    // =========================================================================
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("User is banned from this community")]
    UserBanned,

    #[error("Only admins can post in this community")]
    AdminsOnlyPosting,

    // =========================================================================
    // Invalid State
    // =========================================================================
    #[error("Cannot remove the community creator")]
    CannotRemoveCreator,

    #[error("Cannot moderate the community creator")]
    CannotModerateCreator,

    #[error("Cannot moderate yourself")]
    CannotModerateSelf,

    #[error("Cannot demote the community creator")]
    CannotDemoteCreator,

    #[error("The creator cannot leave their own community")]
    CreatorCannotLeave,

    #[error("At least one admin besides the creator is required")]
    LastAdminRequired,

    #[error("Mute duration must be between 1 and {max} minutes")]
    InvalidMuteDuration { max: i64 },

    #[error("User {0} is not a member of this community")]
    NotMember(Snowflake),

    #[error("User is already an admin")]
    AlreadyAdmin,

    #[error("User is not an admin")]
    NotAdmin,

    #[error("User is muted until {until}")]
    UserMuted { until: DateTime<Utc> },

    #[error("Slow mode is active, retry in {retry_after_secs} seconds")]
    SlowModeActive { retry_after_secs: i64 },

    #[error("Cannot change message status from {from} to {to}")]
    InvalidStatusTransition {
        from: MessageStatus,
        to: MessageStatus,
    },

    #[error("A direct conversation needs two distinct participants")]
    SelfConversation,

    #[error("Only direct conversations track unread state")]
    DirectConversationOnly,

    #[error("Field is locked: {0}")]
    FieldLocked(&'static str),

    // =========================================================================
    // Invite Errors
    // =========================================================================
    #[error("Invalid invite code")]
    InvalidInviteCode,

    #[error("Invite code has expired")]
    InviteExpired,

    #[error("Invite code has reached its usage limit")]
    InviteUsageExceeded,

    // =========================================================================
    // Conflict Errors
    // =========================================================================
    #[error("Already a member of this community")]
    AlreadyMember,

    #[error("A join request is already pending")]
    AlreadyRequested,

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Message needs content or at least one attachment")]
    EmptyMessage,

    #[error("Content too long: max {max} characters")]
    ContentTooLong { max: usize },

    // =========================================================================
    // Infrastructure Errors (wrapped)
    // =========================================================================
    #[error("Store failure: {0}")]
    StoreFailure(String),
}

impl DomainError {
    /// Stable error code for callers that match on strings
    pub fn code(&self) -> &'static str {
        match self {
            // Not Found
            Self::CommunityNotFound(_) => "UNKNOWN_COMMUNITY",
            Self::ConversationNotFound(_) => "UNKNOWN_CONVERSATION",
            Self::MessageNotFound(_) => "UNKNOWN_MESSAGE",
            Self::UserNotFound(_) => "UNKNOWN_USER",
            Self::NoSuchRequest(_) => "NO_SUCH_REQUEST",
            Self::NoSuchBan(_) => "NO_SUCH_BAN",
            Self::NoSuchMute(_) => "NO_SUCH_MUTE",

            // Authorization
            Self::NotAuthorized(_) => "NOT_AUTHORIZED",
            Self::UserBanned => "USER_BANNED",
            Self::AdminsOnlyPosting => "ADMINS_ONLY_POSTING",

            // Invalid state
            Self::CannotRemoveCreator => "CANNOT_REMOVE_CREATOR",
            Self::CannotModerateCreator => "CANNOT_MODERATE_CREATOR",
            Self::CannotModerateSelf => "CANNOT_MODERATE_SELF",
            Self::CannotDemoteCreator => "CANNOT_DEMOTE_CREATOR",
            Self::CreatorCannotLeave => "CREATOR_CANNOT_LEAVE",
            Self::LastAdminRequired => "LAST_ADMIN_REQUIRED",
            Self::InvalidMuteDuration { .. } => "INVALID_MUTE_DURATION",
            Self::NotMember(_) => "NOT_MEMBER",
            Self::AlreadyAdmin => "ALREADY_ADMIN",
            Self::NotAdmin => "NOT_ADMIN",
            Self::UserMuted { .. } => "USER_MUTED",
            Self::SlowModeActive { .. } => "SLOW_MODE_ACTIVE",
            Self::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::SelfConversation => "SELF_CONVERSATION",
            Self::DirectConversationOnly => "DIRECT_CONVERSATION_ONLY",
            Self::FieldLocked(_) => "FIELD_LOCKED",

            // Invites
            Self::InvalidInviteCode => "INVALID_INVITE_CODE",
            Self::InviteExpired => "INVITE_EXPIRED",
            Self::InviteUsageExceeded => "INVITE_USAGE_EXCEEDED",

            // Conflict
            Self::AlreadyMember => "ALREADY_MEMBER",
            Self::AlreadyRequested => "ALREADY_REQUESTED",

            // Validation
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::EmptyMessage => "EMPTY_MESSAGE",
            Self::ContentTooLong { .. } => "CONTENT_TOO_LONG",

            // Infrastructure
            Self::StoreFailure(_) => "STORE_FAILURE",
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CommunityNotFound(_)
                | Self::ConversationNotFound(_)
                | Self::MessageNotFound(_)
                | Self::UserNotFound(_)
                | Self::NoSuchRequest(_)
                | Self::NoSuchBan(_)
                | Self::NoSuchMute(_)
        )
    }

    /// Check if a role check failed
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            Self::NotAuthorized(_) | Self::UserBanned | Self::AdminsOnlyPosting
        )
    }

    /// Check if the operation would break a community or message invariant
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            Self::CannotRemoveCreator
                | Self::CannotModerateCreator
                | Self::CannotModerateSelf
                | Self::CannotDemoteCreator
                | Self::CreatorCannotLeave
                | Self::LastAdminRequired
                | Self::InvalidMuteDuration { .. }
                | Self::NotMember(_)
                | Self::AlreadyAdmin
                | Self::NotAdmin
                | Self::UserMuted { .. }
                | Self::SlowModeActive { .. }
                | Self::InvalidStatusTransition { .. }
                | Self::SelfConversation
                | Self::DirectConversationOnly
                | Self::FieldLocked(_)
        )
    }

    pub fn is_invite(&self) -> bool {
        matches!(
            self,
            Self::InvalidInviteCode | Self::InviteExpired | Self::InviteUsageExceeded
        )
    }

    /// Check if this is a conflict (already exists) error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyMember | Self::AlreadyRequested)
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_) | Self::EmptyMessage | Self::ContentTooLong { .. }
        )
    }

    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            DomainError::CommunityNotFound(Snowflake::new(1)).code(),
            "UNKNOWN_COMMUNITY"
        );
        assert_eq!(DomainError::InviteUsageExceeded.code(), "INVITE_USAGE_EXCEEDED");
        assert_eq!(
            DomainError::NotAuthorized("admin required".into()).code(),
            "NOT_AUTHORIZED"
        );
    }

    #[test]
    fn test_classification_is_disjoint() {
        let samples = [
            DomainError::NoSuchRequest(Snowflake::new(2)),
            DomainError::UserBanned,
            DomainError::LastAdminRequired,
            DomainError::InviteExpired,
            DomainError::AlreadyRequested,
            DomainError::EmptyMessage,
            DomainError::StoreFailure("down".into()),
        ];
        for err in &samples {
            let hits = [
                err.is_not_found(),
                err.is_authorization(),
                err.is_invalid_state(),
                err.is_invite(),
                err.is_conflict(),
                err.is_validation(),
                err.is_store_failure(),
            ]
            .iter()
            .filter(|hit| **hit)
            .count();
            assert_eq!(hits, 1, "{err:?} should belong to exactly one class");
        }
    }

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidMuteDuration { max: 60 };
        assert_eq!(err.to_string(), "Mute duration must be between 1 and 60 minutes");

        let err = DomainError::InvalidStatusTransition {
            from: MessageStatus::Read,
            to: MessageStatus::Failed,
        };
        assert_eq!(err.to_string(), "Cannot change message status from READ to FAILED");
    }
}
