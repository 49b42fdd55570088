//! Repository traits (ports) - define the interface for data access
//!
//! The domain layer states what it needs from the document store; the
//! backends in `circle-store` and `circle-db` provide it. Every mutation
//! that touches membership sets or counters is a single atomic call here,
//! never a read-modify-write driven by the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{
    AdvancedSettings, BanRecord, Community, CommunityPatch, Conversation, Deletion, InviteCode,
    JoinRequest, Message, MessagePermissions, MessageSummary, MuteRecord, Notification, Presence,
    UserProfile,
};
use crate::error::DomainError;
use crate::value_objects::{ConversationId, Snowflake};

/// Result type for repository operations
pub type RepoResult<T> = Result<T, DomainError>;

// ============================================================================
// Community Repository
// ============================================================================

#[async_trait]
pub trait CommunityRepository: Send + Sync {
    /// Find community by ID, including soft-deleted ones
    async fn find_by_id(&self, id: Snowflake) -> RepoResult<Option<Community>>;

    /// Find the community currently owning an invite code
    async fn find_by_invite_code(&self, code: &str) -> RepoResult<Option<Community>>;

    /// Live communities the user belongs to
    async fn find_by_member(&self, user_id: Snowflake) -> RepoResult<Vec<Community>>;

    async fn create(&self, community: &Community) -> RepoResult<()>;

    async fn update_details(&self, id: Snowflake, patch: &CommunityPatch) -> RepoResult<Community>;

    async fn update_settings(
        &self,
        id: Snowflake,
        permissions: MessagePermissions,
        settings: &AdvancedSettings,
    ) -> RepoResult<Community>;

    async fn soft_delete(&self, id: Snowflake, deletion: Deletion) -> RepoResult<()>;

    /// Union the user into members. False if already a member.
    /// Fails with `UserBanned` when a ban exists at write time.
    async fn add_member(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool>;

    /// Union many users at once, skipping members and banned users.
    /// Returns the ids actually added.
    async fn add_members(&self, id: Snowflake, user_ids: &[Snowflake])
        -> RepoResult<Vec<Snowflake>>;

    /// Remove from members and admins; the creator is never removed
    async fn remove_member(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool>;

    /// Grant admin to a member. Fails with `NotMember` for non-members.
    async fn add_admin(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool>;

    async fn remove_admin(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool>;

    /// False when the user is already a member or already waiting
    async fn add_join_request(&self, id: Snowflake, request: JoinRequest) -> RepoResult<bool>;

    async fn remove_join_request(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool>;

    /// Move a pending request into members in one step; false if none pending
    async fn approve_join_request(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool>;

    /// Evict the user and record the ban in one step
    async fn add_ban(&self, id: Snowflake, ban: &BanRecord) -> RepoResult<()>;

    async fn remove_ban(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool>;

    /// Replaces any older mute for the same user
    async fn add_mute(&self, id: Snowflake, mute: &MuteRecord) -> RepoResult<()>;

    async fn remove_mute(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool>;

    /// Replace the invite code wholesale; `None` revokes it
    async fn set_invite(&self, id: Snowflake, invite: Option<&InviteCode>) -> RepoResult<()>;

    /// Conditional atomic redemption: the code still matches, is valid at
    /// `now`, and the user is neither a member nor banned. On success adds
    /// the member and bumps the usage counter, returning the updated
    /// community. Failures use the invite and membership error variants.
    async fn redeem_invite(
        &self,
        code: &str,
        user_id: Snowflake,
        now: DateTime<Utc>,
    ) -> RepoResult<Community>;

    async fn set_last_message(&self, id: Snowflake, summary: &MessageSummary) -> RepoResult<()>;
}

// ============================================================================
// Conversation Repository
// ============================================================================

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_id(&self, id: &ConversationId) -> RepoResult<Option<Conversation>>;

    /// Direct conversations of a user, newest activity first
    async fn find_by_participant(&self, user_id: Snowflake) -> RepoResult<Vec<Conversation>>;

    /// Insert unless a record with the same id exists; returns the stored record
    async fn create_if_absent(&self, conversation: &Conversation) -> RepoResult<Conversation>;

    /// Atomic increment; returns the new counter value
    async fn increment_unread(
        &self,
        id: &ConversationId,
        user_id: Snowflake,
        delta: i64,
    ) -> RepoResult<i64>;

    async fn reset_unread(&self, id: &ConversationId, user_id: Snowflake) -> RepoResult<()>;

    async fn set_last_message(&self, id: &ConversationId, summary: &MessageSummary)
        -> RepoResult<()>;
}

// ============================================================================
// Message Repository
// ============================================================================

/// Query parameters for message history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageQuery {
    pub limit: usize,
    /// Only messages with a smaller sequence
    pub before_sequence: Option<i64>,
}

impl MessageQuery {
    pub fn latest(limit: usize) -> Self {
        Self {
            limit,
            before_sequence: None,
        }
    }

    pub fn before(mut self, sequence: i64) -> Self {
        self.before_sequence = Some(sequence);
        self
    }
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self::latest(50)
    }
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist a message. The store assigns `sequence` and `created_at` and
    /// returns the stored copy; on error nothing is written.
    async fn create(&self, message: Message) -> RepoResult<Message>;

    async fn find_by_id(&self, id: Snowflake) -> RepoResult<Option<Message>>;

    /// The newest `limit` messages, returned in ascending sequence order
    async fn find_by_conversation(
        &self,
        conversation_id: &ConversationId,
        query: MessageQuery,
    ) -> RepoResult<Vec<Message>>;

    /// Direct messages exchanged between two users, matched on sender and
    /// recipient instead of conversation id. Same ordering as above.
    async fn find_between(
        &self,
        a: Snowflake,
        b: Snowflake,
        query: MessageQuery,
    ) -> RepoResult<Vec<Message>>;

    /// Flip delivered on undelivered messages addressed to `recipient_id`.
    /// Returns the number of messages changed.
    async fn mark_delivered(
        &self,
        conversation_id: &ConversationId,
        recipient_id: Snowflake,
    ) -> RepoResult<u64>;

    /// Flip read (and delivered) on unread messages addressed to `recipient_id`
    async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        recipient_id: Snowflake,
    ) -> RepoResult<u64>;

    /// SENT -> FAILED; any other source status is `InvalidStatusTransition`
    async fn mark_failed(&self, id: Snowflake) -> RepoResult<Message>;

    async fn last_sent_by(
        &self,
        conversation_id: &ConversationId,
        sender_id: Snowflake,
    ) -> RepoResult<Option<Message>>;

    /// Delete messages created before `cutoff`; returns how many were removed
    async fn delete_before(
        &self,
        conversation_id: &ConversationId,
        cutoff: DateTime<Utc>,
    ) -> RepoResult<u64>;
}

// ============================================================================
// Notifications
// ============================================================================

/// Accepts notifications for asynchronous delivery
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> RepoResult<()>;
}

/// Read side of stores that keep delivered notifications
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Newest first
    async fn find_by_user(
        &self,
        user_id: Snowflake,
        unread_only: bool,
        limit: usize,
    ) -> RepoResult<Vec<Notification>>;

    async fn mark_read(&self, user_id: Snowflake, id: Snowflake) -> RepoResult<bool>;

    async fn unread_count(&self, user_id: Snowflake) -> RepoResult<i64>;
}

// ============================================================================
// Presence & Directory
// ============================================================================

#[async_trait]
pub trait PresenceRepository: Send + Sync {
    async fn get(&self, user_id: Snowflake) -> RepoResult<Option<Presence>>;

    async fn set(&self, presence: &Presence) -> RepoResult<()>;
}

/// Read-only user lookup
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: Snowflake) -> RepoResult<Option<UserProfile>>;

    async fn find_by_username(&self, username: &str) -> RepoResult<Option<UserProfile>>;
}
