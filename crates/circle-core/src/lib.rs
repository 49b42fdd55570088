//! # circle-core
//!
//! Domain layer of the community messaging engine: communities and their
//! moderation records, direct conversations, messages, the role resolver,
//! store events, and the ports every storage backend implements.
//! This crate has no infrastructure dependencies (database, cache, runtime).

pub mod entities;
pub mod error;
pub mod events;
pub mod policy;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    generate_invite_code, AdvancedSettings, BanRecord, Community, CommunityCategory,
    CommunityPatch, Conversation, Deletion, InviteCode, JoinRequest, LinkPreview, LockFlags,
    Message, MessageKind, MessagePermissions, MessageStatus, MessageSummary, MessageTarget,
    MuteRecord, Notification, NotificationKind, Presence, UserProfile,
};
pub use error::DomainError;
pub use events::{FeedTopic, StoreEvent};
pub use policy::{can_moderate, is_authorized_admin, is_muted, role_of, MemberRole};
pub use traits::{
    ChangeFeed, Clock, CommunityRepository, ConversationRepository, FeedListener, ManualClock,
    MessageQuery, MessageRepository, NotificationRepository, NotificationSink,
    PresenceRepository, RepoResult, Subscription, SystemClock, UserDirectory,
};
pub use value_objects::{
    ConversationId, ConversationIdParseError, Snowflake, SnowflakeGenerator, SnowflakeParseError,
};
