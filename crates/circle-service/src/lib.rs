//! # circle-service
//!
//! Application layer: invite codes, membership and moderation, the
//! conversation directory, message delivery, notification fan-out and live
//! subscriptions. Services borrow a [`ServiceContext`] holding the ports.

pub mod dto;
pub mod services;

pub use services::{
    BulkOutcome, CommunityService, ConversationDirectory, ErrorKind, InvitePreview, InviteService,
    JoinOutcome, MembershipService, MessageService, ModerationService, NotificationDispatcher,
    PermissionService, PresenceService, ServiceContext, ServiceContextBuilder, ServiceError,
    ServiceResult, SubscriptionHandle, SubscriptionService,
};
