//! Database models - SQLx-compatible structs for PostgreSQL tables

mod community;
mod conversation;
mod message;
mod notification;
mod presence;
mod user;

pub use community::{
    BanModel, CommunityModel, JoinRequestModel, MemberModel, MuteModel, COMMUNITY_COLUMNS,
};
pub use conversation::{ConversationModel, CONVERSATION_COLUMNS};
pub use message::{MessageModel, MESSAGE_COLUMNS};
pub use notification::NotificationModel;
pub use presence::PresenceModel;
pub use user::UserModel;
