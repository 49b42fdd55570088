//! Community entity <-> model mapper
//!
//! A community is stored as one row plus its member, request, ban and mute
//! rows; [`CommunityDocument`] gathers them back into the entity.

use std::collections::BTreeSet;

use circle_core::{
    AdvancedSettings, BanRecord, Community, CommunityCategory, Deletion, InviteCode, JoinRequest,
    LockFlags, MessagePermissions, MuteRecord, Snowflake,
};

use super::summary_from_columns;
use crate::models::{BanModel, CommunityModel, JoinRequestModel, MemberModel, MuteModel};

/// One community row with every child row loaded
#[derive(Debug, Clone)]
pub struct CommunityDocument {
    pub row: CommunityModel,
    pub members: Vec<MemberModel>,
    pub join_requests: Vec<JoinRequestModel>,
    pub bans: Vec<BanModel>,
    pub mutes: Vec<MuteModel>,
}

fn non_negative(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

impl From<CommunityDocument> for Community {
    fn from(doc: CommunityDocument) -> Self {
        let row = doc.row;
        let id = Snowflake::new(row.id);

        let members: BTreeSet<Snowflake> =
            doc.members.iter().map(|m| Snowflake::new(m.user_id)).collect();
        let admins: BTreeSet<Snowflake> = doc
            .members
            .iter()
            .filter(|m| m.is_admin)
            .map(|m| Snowflake::new(m.user_id))
            .collect();

        let invite = row.invite_code.map(|code| InviteCode {
            code,
            community_id: id,
            created_by: Snowflake::new(row.invite_created_by.unwrap_or(row.creator_id)),
            created_at: row.invite_created_at.unwrap_or(row.updated_at),
            expires_at: row.invite_expires_at,
            usage_limit: u32::try_from(row.invite_usage_limit).unwrap_or(0),
            usage_count: u32::try_from(row.invite_usage_count).unwrap_or(0),
        });

        let deletion = match (row.deleted_by, row.deleted_at) {
            (Some(by), Some(at)) => Some(Deletion {
                deleted_by: Snowflake::new(by),
                deleted_at: at,
            }),
            _ => None,
        };

        Community {
            id,
            name: row.name,
            description: row.description,
            photo_url: row.photo_url,
            category: CommunityCategory::from_name(&row.category),
            creator_id: Snowflake::new(row.creator_id),
            members_count: i64::try_from(members.len()).unwrap_or(row.members_count),
            members,
            admins,
            is_public: row.is_public,
            tags: row.tags.into_iter().collect(),
            join_requests: doc
                .join_requests
                .into_iter()
                .map(|r| JoinRequest::new(Snowflake::new(r.user_id), r.requested_at))
                .collect(),
            bans: doc
                .bans
                .into_iter()
                .map(|b| BanRecord {
                    user_id: Snowflake::new(b.user_id),
                    moderator_id: Snowflake::new(b.moderator_id),
                    banned_at: b.banned_at,
                    reason: b.reason,
                })
                .collect(),
            mutes: doc
                .mutes
                .into_iter()
                .map(|m| MuteRecord {
                    user_id: Snowflake::new(m.user_id),
                    moderator_id: Snowflake::new(m.moderator_id),
                    started_at: m.started_at,
                    ends_at: m.ends_at,
                    reason: m.reason,
                })
                .collect(),
            invite,
            permissions: MessagePermissions {
                only_admins_can_post: row.only_admins_can_post,
                approval_required: row.approval_required,
            },
            settings: AdvancedSettings {
                locks: LockFlags::from_bits_truncate(u8::try_from(row.lock_flags).unwrap_or(0)),
                slow_mode: non_negative(row.slow_mode_secs),
                auto_delete: non_negative(row.auto_delete_days),
                members_list_visible: row.members_list_visible,
                members_can_add: row.members_can_add,
            },
            last_message: summary_from_columns(
                row.last_message_id,
                row.last_message_sender,
                row.last_message_preview,
                row.last_message_kind,
                row.last_message_at,
            ),
            deletion,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Scalar columns of a community, ready for binding
pub struct CommunityValues<'a> {
    pub id: i64,
    pub name: &'a str,
    pub description: &'a str,
    pub photo_url: Option<&'a str>,
    pub category: &'static str,
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
    pub invite_code: Option<&'a str>,
    pub invite_created_by: Option<i64>,
    pub invite_created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub invite_expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub invite_usage_limit: i32,
    pub invite_usage_count: i32,
    pub deleted_by: Option<i64>,
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl<'a> CommunityValues<'a> {
    pub fn new(community: &'a Community) -> Self {
        let invite = community.invite.as_ref();
        Self {
            id: community.id.into_inner(),
            name: &community.name,
            description: &community.description,
            photo_url: community.photo_url.as_deref(),
            category: community.category.as_str(),
            creator_id: community.creator_id.into_inner(),
            is_public: community.is_public,
            tags: community.tags.iter().cloned().collect(),
            members_count: community.members_count,
            only_admins_can_post: community.permissions.only_admins_can_post,
            approval_required: community.permissions.approval_required,
            lock_flags: i16::from(community.settings.locks.bits()),
            slow_mode_secs: community.settings.slow_mode.map(clamp_i32),
            auto_delete_days: community.settings.auto_delete.map(clamp_i32),
            members_list_visible: community.settings.members_list_visible,
            members_can_add: community.settings.members_can_add,
            invite_code: invite.map(|i| i.code.as_str()),
            invite_created_by: invite.map(|i| i.created_by.into_inner()),
            invite_created_at: invite.map(|i| i.created_at),
            invite_expires_at: invite.and_then(|i| i.expires_at),
            invite_usage_limit: invite.map_or(0, |i| clamp_i32(i.usage_limit)),
            invite_usage_count: invite.map_or(0, |i| clamp_i32(i.usage_count)),
            deleted_by: community.deletion.map(|d| d.deleted_by.into_inner()),
            deleted_at: community.deletion.map(|d| d.deleted_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(id: i64, creator_id: i64) -> CommunityModel {
        let now = Utc::now();
        CommunityModel {
            id,
            name: "rust".into(),
            description: String::new(),
            photo_url: None,
            category: "Technology".into(),
            creator_id,
            is_public: true,
            tags: vec!["systems".into()],
            members_count: 2,
            only_admins_can_post: false,
            approval_required: true,
            lock_flags: 0b101,
            slow_mode_secs: Some(30),
            auto_delete_days: Some(-1),
            members_list_visible: true,
            members_can_add: false,
            invite_code: Some("ABCD2345".into()),
            invite_created_by: Some(creator_id),
            invite_created_at: Some(now),
            invite_expires_at: None,
            invite_usage_limit: 3,
            invite_usage_count: 1,
            last_message_id: None,
            last_message_sender: None,
            last_message_preview: None,
            last_message_kind: None,
            last_message_at: None,
            deleted_by: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn member(user_id: i64, is_admin: bool) -> MemberModel {
        MemberModel {
            community_id: 10,
            user_id,
            is_admin,
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn test_document_to_entity() {
        let doc = CommunityDocument {
            row: row(10, 1),
            members: vec![member(1, true), member(2, false)],
            join_requests: vec![],
            bans: vec![],
            mutes: vec![],
        };
        let community = Community::from(doc);

        assert_eq!(community.category, CommunityCategory::Technology);
        assert!(community.is_admin(Snowflake::new(1)));
        assert!(!community.is_admin(Snowflake::new(2)));
        assert_eq!(community.members_count, 2);
        assert_eq!(community.settings.locks, LockFlags::NAME | LockFlags::PHOTO);
        assert_eq!(community.settings.slow_mode, Some(30));
        assert_eq!(community.settings.auto_delete, None);
        assert_eq!(community.invite.as_ref().unwrap().remaining_uses(), Some(2));
        assert!(community.invariants_hold());
    }

    #[test]
    fn test_values_flatten_settings() {
        let mut community = Community::new(Snowflake::new(10), Snowflake::new(1), "c".into(), Utc::now());
        community.settings.locks = LockFlags::DESCRIPTION;
        community.settings.slow_mode = Some(15);
        let values = CommunityValues::new(&community);
        assert_eq!(values.lock_flags, 2);
        assert_eq!(values.slow_mode_secs, Some(15));
        assert_eq!(values.category, "general");
        assert!(values.invite_code.is_none());
    }
}
