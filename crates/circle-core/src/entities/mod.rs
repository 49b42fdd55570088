//! Domain entities - core business objects

mod community;
mod conversation;
mod invite;
mod message;
mod moderation;
mod notification;
mod presence;
mod user;

pub use community::{
    AdvancedSettings, Community, CommunityCategory, CommunityPatch, Deletion, LockFlags,
    MessagePermissions,
};
pub use conversation::{Conversation, MessageSummary};
pub use invite::{
    generate_invite_code, is_well_formed_invite_code, normalize_invite_code, InviteCode,
    INVITE_ALPHABET, INVITE_CODE_LEN,
};
pub use message::{LinkPreview, Message, MessageKind, MessageStatus, MessageTarget};
pub use moderation::{BanRecord, JoinRequest, MuteRecord};
pub use notification::{Notification, NotificationKind};
pub use presence::Presence;
pub use user::UserProfile;
