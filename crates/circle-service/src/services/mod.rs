//! Business logic services
//!
//! Each service borrows the [`ServiceContext`] and validates against a fresh
//! snapshot before handing the write to an atomic store operation.

pub mod community;
pub mod context;
pub mod conversation;
pub mod error;
pub mod invite;
pub mod membership;
pub mod message;
pub mod moderation;
pub mod notification;
pub mod permission;
pub mod presence;
pub mod subscription;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export all services for convenience
pub use community::CommunityService;
pub use context::{ServiceContext, ServiceContextBuilder};
pub use conversation::ConversationDirectory;
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use invite::{InvitePreview, InviteService};
pub use membership::{BulkOutcome, JoinOutcome, MembershipService};
pub use message::MessageService;
pub use moderation::ModerationService;
pub use notification::NotificationDispatcher;
pub use permission::PermissionService;
pub use presence::PresenceService;
pub use subscription::{SubscriptionHandle, SubscriptionService};
