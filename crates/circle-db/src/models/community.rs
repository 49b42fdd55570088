//! Community database models

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Column list matching [`CommunityModel`]
pub const COMMUNITY_COLUMNS: &str = "id, name, description, photo_url, category, creator_id, \
    is_public, tags, members_count, only_admins_can_post, approval_required, lock_flags, \
    slow_mode_secs, auto_delete_days, members_list_visible, members_can_add, invite_code, \
    invite_created_by, invite_created_at, invite_expires_at, invite_usage_limit, \
    invite_usage_count, last_message_id, last_message_sender, last_message_preview, \
    last_message_kind, last_message_at, deleted_by, deleted_at, created_at, updated_at";

/// Database model for communities table
#[derive(Debug, Clone, FromRow)]
pub struct CommunityModel {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub photo_url: Option<String>,
    pub category: String,
    pub creator_id: i64,
    pub is_public: bool,
    pub tags: Vec<String>,
    pub members_count: i64,

    pub only_admins_can_post: bool,
    pub approval_required: bool,
    pub lock_flags: i16,
    pub slow_mode_secs: Option<i32>,
    pub auto_delete_days: Option<i32>,
    pub members_list_visible: bool,
    pub members_can_add: bool,

    pub invite_code: Option<String>,
    pub invite_created_by: Option<i64>,
    pub invite_created_at: Option<DateTime<Utc>>,
    pub invite_expires_at: Option<DateTime<Utc>>,
    pub invite_usage_limit: i32,
    pub invite_usage_count: i32,

    pub last_message_id: Option<i64>,
    pub last_message_sender: Option<i64>,
    pub last_message_preview: Option<String>,
    pub last_message_kind: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,

    pub deleted_by: Option<i64>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommunityModel {
    /// Check if community is soft deleted
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Database model for community_members table
#[derive(Debug, Clone, FromRow)]
pub struct MemberModel {
    pub community_id: i64,
    pub user_id: i64,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

/// Database model for community_join_requests table
#[derive(Debug, Clone, FromRow)]
pub struct JoinRequestModel {
    pub community_id: i64,
    pub user_id: i64,
    pub requested_at: DateTime<Utc>,
}

/// Database model for community_bans table
#[derive(Debug, Clone, FromRow)]
pub struct BanModel {
    pub community_id: i64,
    pub user_id: i64,
    pub moderator_id: i64,
    pub banned_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Database model for community_mutes table
#[derive(Debug, Clone, FromRow)]
pub struct MuteModel {
    pub community_id: i64,
    pub user_id: i64,
    pub moderator_id: i64,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: Option<String>,
}
