//! Request DTOs
//!
//! All request DTOs implement `Deserialize` and `Validate` for input validation.

use std::collections::BTreeSet;

use circle_core::{
    AdvancedSettings, CommunityCategory, CommunityPatch, LinkPreview, LockFlags, MessageKind,
    MessagePermissions, Snowflake,
};
use serde::Deserialize;
use validator::Validate;

// ============================================================================
// Community Requests
// ============================================================================

/// Create community request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCommunityRequest {
    #[validate(length(min = 1, max = 100, message = "Community name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,

    /// Category name, unknown names fall back to "other"
    pub category: Option<String>,

    #[serde(default = "default_public")]
    pub is_public: bool,

    #[serde(default)]
    #[validate(length(max = 20, message = "At most 20 tags"))]
    pub tags: Vec<String>,

    #[validate(url(message = "Invalid photo URL"))]
    pub photo_url: Option<String>,
}

fn default_public() -> bool {
    true
}

impl CreateCommunityRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            category: None,
            is_public: true,
            tags: Vec::new(),
            photo_url: None,
        }
    }

    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }

    pub fn category(&self) -> CommunityCategory {
        self.category
            .as_deref()
            .map_or(CommunityCategory::General, CommunityCategory::from_name)
    }

    pub fn tags(&self) -> BTreeSet<String> {
        normalize_tags(&self.tags)
    }
}

/// Update community request; absent fields stay unchanged
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateCommunityRequest {
    #[validate(length(min = 1, max = 100, message = "Community name must be 1-100 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,

    /// Photo URL, or an empty string to remove it
    pub photo_url: Option<String>,

    pub category: Option<String>,

    #[validate(length(max = 20, message = "At most 20 tags"))]
    pub tags: Option<Vec<String>>,

    pub is_public: Option<bool>,
}

impl UpdateCommunityRequest {
    pub fn into_patch(self) -> CommunityPatch {
        CommunityPatch {
            name: self.name.map(|n| n.trim().to_string()),
            description: self.description,
            photo_url: self
                .photo_url
                .map(|url| Some(url.trim().to_string()).filter(|url| !url.is_empty())),
            category: self.category.as_deref().map(CommunityCategory::from_name),
            tags: self.tags.as_deref().map(normalize_tags),
            is_public: self.is_public,
        }
    }
}

/// Update message permissions and advanced settings.
/// Zero for `slow_mode_secs` or `auto_delete_days` turns the feature off.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    pub only_admins_can_post: Option<bool>,
    pub approval_required: Option<bool>,

    pub lock_name: Option<bool>,
    pub lock_description: Option<bool>,
    pub lock_photo: Option<bool>,

    #[validate(range(max = 86_400, message = "Slow mode interval must be at most one day"))]
    pub slow_mode_secs: Option<u32>,

    #[validate(range(max = 3650, message = "Retention must be at most 3650 days"))]
    pub auto_delete_days: Option<u32>,

    pub members_list_visible: Option<bool>,
    pub members_can_add: Option<bool>,
}

impl UpdateSettingsRequest {
    /// Lock flags this request sets, and which of them it touches at all
    pub fn locks(&self) -> (LockFlags, LockFlags) {
        let mut touched = LockFlags::empty();
        let mut set = LockFlags::empty();
        for (flag, value) in [
            (LockFlags::NAME, self.lock_name),
            (LockFlags::DESCRIPTION, self.lock_description),
            (LockFlags::PHOTO, self.lock_photo),
        ] {
            if let Some(on) = value {
                touched |= flag;
                set.set(flag, on);
            }
        }
        (set, touched)
    }

    /// Apply onto the current values
    pub fn apply(
        &self,
        permissions: MessagePermissions,
        settings: &AdvancedSettings,
    ) -> (MessagePermissions, AdvancedSettings) {
        let permissions = MessagePermissions {
            only_admins_can_post: self
                .only_admins_can_post
                .unwrap_or(permissions.only_admins_can_post),
            approval_required: self
                .approval_required
                .unwrap_or(permissions.approval_required),
        };

        let (set, touched) = self.locks();
        let mut next = settings.clone();
        next.locks = (settings.locks - touched) | set;
        if let Some(secs) = self.slow_mode_secs {
            next.slow_mode = (secs > 0).then_some(secs);
        }
        if let Some(days) = self.auto_delete_days {
            next.auto_delete = (days > 0).then_some(days);
        }
        if let Some(visible) = self.members_list_visible {
            next.members_list_visible = visible;
        }
        if let Some(can_add) = self.members_can_add {
            next.members_can_add = can_add;
        }
        (permissions, next)
    }
}

fn normalize_tags(tags: &[String]) -> BTreeSet<String> {
    tags.iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

// ============================================================================
// Invite Requests
// ============================================================================

/// Generate or reset an invite code; absent values use the configured defaults
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct GenerateInviteRequest {
    #[validate(range(min = 1, max = 525_600, message = "Expiry must be 1 minute to 1 year"))]
    pub expiry_minutes: Option<i64>,

    /// Zero means unlimited
    pub usage_limit: Option<u32>,
}

impl GenerateInviteRequest {
    pub fn expiring_in(mut self, minutes: i64) -> Self {
        self.expiry_minutes = Some(minutes);
        self
    }

    pub fn limited_to(mut self, uses: u32) -> Self {
        self.usage_limit = Some(uses);
        self
    }
}

// ============================================================================
// Moderation Requests
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct BanRequest {
    #[validate(length(max = 512, message = "Reason must be at most 512 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MuteRequest {
    /// Bounded by `moderation.max_mute_minutes`
    pub duration_minutes: i64,

    #[validate(length(max = 512, message = "Reason must be at most 512 characters"))]
    pub reason: Option<String>,
}

impl MuteRequest {
    pub fn minutes(duration_minutes: i64) -> Self {
        Self {
            duration_minutes,
            reason: None,
        }
    }
}

// ============================================================================
// Message Requests
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendDirectRequest {
    pub recipient_id: Snowflake,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    #[validate(length(max = 10, message = "At most 10 attachments"))]
    pub attachments: Vec<String>,

    #[serde(default)]
    pub kind: MessageKind,

    pub link_preview: Option<LinkPreview>,
}

impl SendDirectRequest {
    pub fn text(recipient_id: Snowflake, content: impl Into<String>) -> Self {
        Self {
            recipient_id,
            content: content.into(),
            attachments: Vec::new(),
            kind: MessageKind::Text,
            link_preview: None,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendGroupRequest {
    #[serde(default)]
    pub content: String,

    #[serde(default)]
    #[validate(length(max = 10, message = "At most 10 attachments"))]
    pub attachments: Vec<String>,

    #[serde(default)]
    pub kind: MessageKind,

    pub link_preview: Option<LinkPreview>,
}

impl SendGroupRequest {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachments: Vec::new(),
            kind: MessageKind::Text,
            link_preview: None,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// History paging; `limit` is clamped to the configured maximum
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub before_sequence: Option<i64>,
}

impl HistoryQuery {
    pub fn latest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            before_sequence: None,
        }
    }
}
