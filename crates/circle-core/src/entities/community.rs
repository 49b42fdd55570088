//! Community entity - a named group with members, admins and moderation state

use std::collections::BTreeSet;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BanRecord, InviteCode, JoinRequest, MessageSummary, MuteRecord};
use crate::value_objects::Snowflake;

/// Closed set of community categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunityCategory {
    #[default]
    General,
    Education,
    Technology,
    Gaming,
    Sports,
    Music,
    Art,
    Business,
    Health,
    Other,
}

impl CommunityCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Education => "education",
            Self::Technology => "technology",
            Self::Gaming => "gaming",
            Self::Sports => "sports",
            Self::Music => "music",
            Self::Art => "art",
            Self::Business => "business",
            Self::Health => "health",
            Self::Other => "other",
        }
    }

    /// Case-insensitive; unknown names fall back to `Other`
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "general" => Self::General,
            "education" => Self::Education,
            "technology" => Self::Technology,
            "gaming" => Self::Gaming,
            "sports" => Self::Sports,
            "music" => Self::Music,
            "art" => Self::Art,
            "business" => Self::Business,
            "health" => Self::Health,
            _ => Self::Other,
        }
    }
}

bitflags! {
    /// Fields that only the creator may edit
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LockFlags: u8 {
        const NAME = 1 << 0;
        const DESCRIPTION = 1 << 1;
        const PHOTO = 1 << 2;
    }
}

/// Who may post and how people get in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessagePermissions {
    pub only_admins_can_post: bool,
    /// Routes joins through the request flow even on a public community
    pub approval_required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvancedSettings {
    pub locks: LockFlags,
    /// Minimum seconds between two messages from the same non-admin sender
    pub slow_mode: Option<u32>,
    /// Retention window for messages, in days
    pub auto_delete: Option<u32>,
    pub members_list_visible: bool,
    /// Lets plain members use bulk add
    pub members_can_add: bool,
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            locks: LockFlags::empty(),
            slow_mode: None,
            auto_delete: None,
            members_list_visible: true,
            members_can_add: false,
        }
    }
}

/// Soft-delete marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deletion {
    pub deleted_by: Snowflake,
    pub deleted_at: DateTime<Utc>,
}

/// Partial update of the descriptive fields; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommunityPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub photo_url: Option<Option<String>>,
    pub category: Option<CommunityCategory>,
    pub tags: Option<BTreeSet<String>>,
    pub is_public: Option<bool>,
}

impl CommunityPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Lock flags this patch would need to bypass
    pub fn touched_locks(&self) -> LockFlags {
        let mut locks = LockFlags::empty();
        locks.set(LockFlags::NAME, self.name.is_some());
        locks.set(LockFlags::DESCRIPTION, self.description.is_some());
        locks.set(LockFlags::PHOTO, self.photo_url.is_some());
        locks
    }
}

/// Community document.
///
/// Invariants kept by every store mutation:
/// - the creator is always a member
/// - admins are a subset of members
/// - a banned user is never a member
/// - `members_count` equals the size of `members`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Community {
    pub id: Snowflake,
    pub name: String,
    pub description: String,
    pub photo_url: Option<String>,
    pub category: CommunityCategory,
    pub creator_id: Snowflake,
    pub members: BTreeSet<Snowflake>,
    pub admins: BTreeSet<Snowflake>,
    pub members_count: i64,
    pub is_public: bool,
    pub tags: BTreeSet<String>,
    pub join_requests: Vec<JoinRequest>,
    pub bans: Vec<BanRecord>,
    pub mutes: Vec<MuteRecord>,
    pub invite: Option<InviteCode>,
    pub permissions: MessagePermissions,
    pub settings: AdvancedSettings,
    pub last_message: Option<MessageSummary>,
    pub deletion: Option<Deletion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Community {
    /// A fresh public community whose only member and admin is the creator
    pub fn new(id: Snowflake, creator_id: Snowflake, name: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            description: String::new(),
            photo_url: None,
            category: CommunityCategory::General,
            creator_id,
            members: BTreeSet::from([creator_id]),
            admins: BTreeSet::from([creator_id]),
            members_count: 1,
            is_public: true,
            tags: BTreeSet::new(),
            join_requests: Vec::new(),
            bans: Vec::new(),
            mutes: Vec::new(),
            invite: None,
            permissions: MessagePermissions::default(),
            settings: AdvancedSettings::default(),
            last_message: None,
            deletion: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: CommunityCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_visibility(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_photo(mut self, photo_url: Option<String>) -> Self {
        self.photo_url = photo_url;
        self
    }

    #[inline]
    pub fn is_creator(&self, user_id: Snowflake) -> bool {
        self.creator_id == user_id
    }

    #[inline]
    pub fn is_member(&self, user_id: Snowflake) -> bool {
        self.members.contains(&user_id)
    }

    #[inline]
    pub fn is_admin(&self, user_id: Snowflake) -> bool {
        self.admins.contains(&user_id)
    }

    pub fn is_banned(&self, user_id: Snowflake) -> bool {
        self.bans.iter().any(|ban| ban.user_id == user_id)
    }

    pub fn is_deleted(&self) -> bool {
        self.deletion.is_some()
    }

    pub fn requires_approval(&self) -> bool {
        !self.is_public || self.permissions.approval_required
    }

    pub fn pending_request(&self, user_id: Snowflake) -> Option<&JoinRequest> {
        self.join_requests.iter().find(|r| r.user_id == user_id)
    }

    pub fn ban_of(&self, user_id: Snowflake) -> Option<&BanRecord> {
        self.bans.iter().find(|ban| ban.user_id == user_id)
    }

    /// The mute currently restricting `user_id`, ignoring expired records
    pub fn active_mute(&self, user_id: Snowflake, now: DateTime<Utc>) -> Option<&MuteRecord> {
        self.mutes
            .iter()
            .filter(|mute| mute.user_id == user_id && mute.is_active(now))
            .max_by_key(|mute| mute.ends_at)
    }

    /// Everyone who receives admin notifications: the admin set plus the creator
    pub fn moderators(&self) -> BTreeSet<Snowflake> {
        let mut ids = self.admins.clone();
        ids.insert(self.creator_id);
        ids
    }

    /// Admins other than the creator
    pub fn delegated_admins(&self) -> usize {
        self.admins.iter().filter(|id| **id != self.creator_id).count()
    }

    pub fn invariants_hold(&self) -> bool {
        self.is_member(self.creator_id)
            && self.admins.is_subset(&self.members)
            && self.bans.iter().all(|ban| !self.is_member(ban.user_id))
            && self.members_count == self.members.len() as i64
    }

    // -------------------------------------------------------------------------
    // In-place mutations. Stores apply these under their per-document lock so
    // each one is atomic with respect to other writers.
    // -------------------------------------------------------------------------

    /// Adds a member; false when already present or banned
    pub fn insert_member(&mut self, user_id: Snowflake) -> bool {
        if self.is_banned(user_id) || !self.members.insert(user_id) {
            return false;
        }
        self.join_requests.retain(|r| r.user_id != user_id);
        self.sync_count();
        true
    }

    /// Removes a member and any admin grant; the creator is never removed
    pub fn evict_member(&mut self, user_id: Snowflake) -> bool {
        if self.is_creator(user_id) || !self.members.remove(&user_id) {
            return false;
        }
        self.admins.remove(&user_id);
        self.sync_count();
        true
    }

    /// Grants admin to an existing member; false if not a member or already admin
    pub fn grant_admin(&mut self, user_id: Snowflake) -> bool {
        self.is_member(user_id) && self.admins.insert(user_id)
    }

    pub fn revoke_admin(&mut self, user_id: Snowflake) -> bool {
        !self.is_creator(user_id) && self.admins.remove(&user_id)
    }

    /// Records a join request; false if the user is a member or already waiting
    pub fn push_request(&mut self, request: JoinRequest) -> bool {
        if self.is_member(request.user_id) || self.pending_request(request.user_id).is_some() {
            return false;
        }
        self.join_requests.push(request);
        true
    }

    pub fn drop_request(&mut self, user_id: Snowflake) -> bool {
        let before = self.join_requests.len();
        self.join_requests.retain(|r| r.user_id != user_id);
        before != self.join_requests.len()
    }

    /// Evicts the user and records the ban, replacing an older ban for them
    pub fn record_ban(&mut self, ban: BanRecord) {
        self.evict_member(ban.user_id);
        self.join_requests.retain(|r| r.user_id != ban.user_id);
        self.bans.retain(|b| b.user_id != ban.user_id);
        self.bans.push(ban);
    }

    pub fn lift_ban(&mut self, user_id: Snowflake) -> bool {
        let before = self.bans.len();
        self.bans.retain(|b| b.user_id != user_id);
        before != self.bans.len()
    }

    /// Records a mute; older records for the same user are dropped
    pub fn record_mute(&mut self, mute: MuteRecord) {
        self.mutes.retain(|m| m.user_id != mute.user_id);
        self.mutes.push(mute);
    }

    pub fn lift_mute(&mut self, user_id: Snowflake) -> bool {
        let before = self.mutes.len();
        self.mutes.retain(|m| m.user_id != user_id);
        before != self.mutes.len()
    }

    pub fn apply_patch(&mut self, patch: &CommunityPatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(description) = &patch.description {
            self.description.clone_from(description);
        }
        if let Some(photo_url) = &patch.photo_url {
            self.photo_url.clone_from(photo_url);
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(tags) = &patch.tags {
            self.tags.clone_from(tags);
        }
        if let Some(is_public) = patch.is_public {
            self.is_public = is_public;
        }
    }

    fn sync_count(&mut self) {
        self.members_count = self.members.len() as i64;
    }
}
