//! In-memory community repository
//!
//! Each community lives in one `DashMap` entry; every mutation runs while
//! holding that entry's write guard, which makes the membership unions,
//! removals and counter updates atomic per community.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use circle_core::entities::normalize_invite_code;
use circle_core::{
    AdvancedSettings, BanRecord, ChangeFeed, Clock, Community, CommunityPatch,
    CommunityRepository, Deletion, DomainError, InviteCode, JoinRequest, MessagePermissions,
    MessageSummary, MuteRecord, RepoResult, Snowflake, StoreEvent,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

pub struct MemoryCommunityRepository {
    communities: DashMap<Snowflake, Community>,
    invite_index: DashMap<String, Snowflake>,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
}

impl MemoryCommunityRepository {
    pub fn new(feed: Arc<dyn ChangeFeed>, clock: Arc<dyn Clock>) -> Self {
        Self {
            communities: DashMap::new(),
            invite_index: DashMap::new(),
            feed,
            clock,
        }
    }

    /// Run `f` under the community's write guard. `f` must validate before
    /// it mutates so an error leaves the document untouched.
    fn mutate<T>(
        &self,
        id: Snowflake,
        f: impl FnOnce(&mut Community) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let mut entry = self
            .communities
            .get_mut(&id)
            .filter(|c| !c.is_deleted())
            .ok_or(DomainError::CommunityNotFound(id))?;
        let out = f(&mut entry)?;
        entry.updated_at = self.clock.now();
        Ok(out)
    }

    async fn changed(&self, id: Snowflake) {
        self.feed
            .publish(StoreEvent::CommunityChanged {
                community_id: id,
                at: self.clock.now(),
            })
            .await;
    }

    async fn changed_if(&self, id: Snowflake, changed: bool) -> bool {
        if changed {
            self.changed(id).await;
        }
        changed
    }
}

#[async_trait]
impl CommunityRepository for MemoryCommunityRepository {
    async fn find_by_id(&self, id: Snowflake) -> RepoResult<Option<Community>> {
        Ok(self.communities.get(&id).map(|c| c.clone()))
    }

    async fn find_by_invite_code(&self, code: &str) -> RepoResult<Option<Community>> {
        let Some(id) = self
            .invite_index
            .get(&normalize_invite_code(code))
            .map(|id| *id)
        else {
            return Ok(None);
        };
        self.find_by_id(id).await
    }

    async fn find_by_member(&self, user_id: Snowflake) -> RepoResult<Vec<Community>> {
        let mut found: Vec<Community> = self
            .communities
            .iter()
            .filter(|c| !c.is_deleted() && c.is_member(user_id))
            .map(|c| c.clone())
            .collect();
        found.sort_by_key(|c| c.id);
        Ok(found)
    }

    async fn create(&self, community: &Community) -> RepoResult<()> {
        match self.communities.entry(community.id) {
            Entry::Occupied(_) => {
                return Err(DomainError::StoreFailure(format!(
                    "community {} already exists",
                    community.id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(community.clone());
            }
        }
        if let Some(invite) = &community.invite {
            self.invite_index.insert(invite.code.clone(), community.id);
        }
        self.changed(community.id).await;
        Ok(())
    }

    async fn update_details(&self, id: Snowflake, patch: &CommunityPatch) -> RepoResult<Community> {
        let updated = self.mutate(id, |c| {
            c.apply_patch(patch);
            Ok(c.clone())
        })?;
        self.changed(id).await;
        Ok(updated)
    }

    async fn update_settings(
        &self,
        id: Snowflake,
        permissions: MessagePermissions,
        settings: &AdvancedSettings,
    ) -> RepoResult<Community> {
        let updated = self.mutate(id, |c| {
            c.permissions = permissions;
            c.settings = settings.clone();
            Ok(c.clone())
        })?;
        self.changed(id).await;
        Ok(updated)
    }

    async fn soft_delete(&self, id: Snowflake, deletion: Deletion) -> RepoResult<()> {
        self.mutate(id, |c| {
            c.deletion = Some(deletion);
            if let Some(invite) = c.invite.take() {
                self.invite_index.remove(&invite.code);
            }
            Ok(())
        })?;
        self.changed(id).await;
        Ok(())
    }

    async fn add_member(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let added = self.mutate(id, |c| {
            if c.is_banned(user_id) {
                return Err(DomainError::UserBanned);
            }
            Ok(c.insert_member(user_id))
        })?;
        Ok(self.changed_if(id, added).await)
    }

    async fn add_members(
        &self,
        id: Snowflake,
        user_ids: &[Snowflake],
    ) -> RepoResult<Vec<Snowflake>> {
        let added = self.mutate(id, |c| {
            Ok(user_ids
                .iter()
                .copied()
                .filter(|user_id| c.insert_member(*user_id))
                .collect::<Vec<_>>())
        })?;
        self.changed_if(id, !added.is_empty()).await;
        Ok(added)
    }

    async fn remove_member(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let removed = self.mutate(id, |c| Ok(c.evict_member(user_id)))?;
        Ok(self.changed_if(id, removed).await)
    }

    async fn add_admin(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let granted = self.mutate(id, |c| {
            if !c.is_member(user_id) {
                return Err(DomainError::NotMember(user_id));
            }
            Ok(c.grant_admin(user_id))
        })?;
        Ok(self.changed_if(id, granted).await)
    }

    async fn remove_admin(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let revoked = self.mutate(id, |c| Ok(c.revoke_admin(user_id)))?;
        Ok(self.changed_if(id, revoked).await)
    }

    async fn add_join_request(&self, id: Snowflake, request: JoinRequest) -> RepoResult<bool> {
        let pushed = self.mutate(id, |c| {
            if c.is_banned(request.user_id) {
                return Err(DomainError::UserBanned);
            }
            Ok(c.push_request(request))
        })?;
        Ok(self.changed_if(id, pushed).await)
    }

    async fn remove_join_request(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let dropped = self.mutate(id, |c| Ok(c.drop_request(user_id)))?;
        Ok(self.changed_if(id, dropped).await)
    }

    async fn approve_join_request(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let approved = self.mutate(id, |c| {
            if c.pending_request(user_id).is_none() {
                return Ok(false);
            }
            if c.is_banned(user_id) {
                return Err(DomainError::UserBanned);
            }
            // insert_member also clears the pending request
            Ok(c.insert_member(user_id) || c.drop_request(user_id))
        })?;
        Ok(self.changed_if(id, approved).await)
    }

    async fn add_ban(&self, id: Snowflake, ban: &BanRecord) -> RepoResult<()> {
        self.mutate(id, |c| {
            if c.is_creator(ban.user_id) {
                return Err(DomainError::CannotModerateCreator);
            }
            c.record_ban(ban.clone());
            Ok(())
        })?;
        self.changed(id).await;
        Ok(())
    }

    async fn remove_ban(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let lifted = self.mutate(id, |c| Ok(c.lift_ban(user_id)))?;
        Ok(self.changed_if(id, lifted).await)
    }

    async fn add_mute(&self, id: Snowflake, mute: &MuteRecord) -> RepoResult<()> {
        self.mutate(id, |c| {
            c.record_mute(mute.clone());
            Ok(())
        })?;
        self.changed(id).await;
        Ok(())
    }

    async fn remove_mute(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let lifted = self.mutate(id, |c| Ok(c.lift_mute(user_id)))?;
        Ok(self.changed_if(id, lifted).await)
    }

    async fn set_invite(&self, id: Snowflake, invite: Option<&InviteCode>) -> RepoResult<()> {
        // the index changes under the community guard, so a lookup never
        // resolves a code the community no longer holds
        self.mutate(id, |c| {
            if let Some(new) = invite {
                match self.invite_index.entry(new.code.clone()) {
                    Entry::Occupied(owner) if *owner.get() != id => {
                        return Err(DomainError::StoreFailure(format!(
                            "invite code {} is already in use",
                            new.code
                        )));
                    }
                    Entry::Occupied(_) => {}
                    Entry::Vacant(slot) => {
                        slot.insert(id);
                    }
                }
            }
            if let Some(previous) = c.invite.take() {
                if invite.map(|new| &new.code) != Some(&previous.code) {
                    self.invite_index.remove(&previous.code);
                }
            }
            c.invite = invite.cloned();
            Ok(())
        })?;
        self.changed(id).await;
        Ok(())
    }

    async fn redeem_invite(
        &self,
        code: &str,
        user_id: Snowflake,
        now: DateTime<Utc>,
    ) -> RepoResult<Community> {
        let code = normalize_invite_code(code);
        let id = self
            .invite_index
            .get(&code)
            .map(|id| *id)
            .ok_or(DomainError::InvalidInviteCode)?;

        let community = self
            .mutate(id, |c| {
                let invite = c
                    .invite
                    .as_ref()
                    .filter(|invite| invite.code == code)
                    .ok_or(DomainError::InvalidInviteCode)?;
                invite.check_redeemable(now)?;
                if c.is_member(user_id) {
                    return Err(DomainError::AlreadyMember);
                }
                if c.is_banned(user_id) {
                    return Err(DomainError::UserBanned);
                }

                c.insert_member(user_id);
                if let Some(invite) = c.invite.as_mut() {
                    invite.usage_count += 1;
                }
                Ok(c.clone())
            })
            .map_err(|e| match e {
                // the code outlived its community
                DomainError::CommunityNotFound(_) => DomainError::InvalidInviteCode,
                other => other,
            })?;

        self.changed(id).await;
        Ok(community)
    }

    async fn set_last_message(&self, id: Snowflake, summary: &MessageSummary) -> RepoResult<()> {
        self.mutate(id, |c| {
            let newer = c
                .last_message
                .as_ref()
                .is_none_or(|current| current.sent_at <= summary.sent_at);
            if newer {
                c.last_message = Some(summary.clone());
            }
            Ok(())
        })?;
        self.changed(id).await;
        Ok(())
    }
}
