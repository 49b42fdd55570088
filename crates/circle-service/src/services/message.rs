//! Message service
//!
//! Creates direct and community messages, serves history and moves messages
//! through their status machine. A message is either stored whole or not at
//! all; summaries, unread counters and notifications that follow are
//! secondary and only logged when they fail.

use chrono::Duration;
use circle_core::{
    is_authorized_admin, Community, ConversationId, DomainError, LinkPreview, Message,
    MessageKind, MessageQuery, MessageSummary, MessageTarget, Snowflake,
};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::dto::{HistoryQuery, SendDirectRequest, SendGroupRequest};

use super::context::ServiceContext;
use super::conversation::{ensure_participant, ConversationDirectory};
use super::error::ServiceResult;
use super::notification::NotificationDispatcher;
use super::permission::{ensure_member, PermissionService};

/// Message service
pub struct MessageService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> MessageService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Send to one user. Resolves (or creates) the direct conversation.
    #[instrument(skip(self, request), fields(recipient_id = %request.recipient_id))]
    pub async fn send_direct(
        &self,
        sender_id: Snowflake,
        request: SendDirectRequest,
    ) -> ServiceResult<Message> {
        request.validate()?;
        let message = Message::direct(
            self.ctx.generate_id(),
            sender_id,
            request.recipient_id,
            request.content,
        )?
        .with_attachments(request.attachments)
        .with_kind(request.kind)
        .with_link_preview(request.link_preview);
        message.validate(self.ctx.config().messaging.max_content_length)?;

        let conversation = ConversationDirectory::new(self.ctx)
            .resolve_direct(sender_id, request.recipient_id)
            .await?;

        let stored = self
            .ctx
            .store(self.ctx.message_repo().create(message))
            .await?;
        info!(
            message_id = %stored.id,
            conversation_id = %conversation.id,
            sender_id = %sender_id,
            "Direct message sent"
        );

        let summary = MessageSummary::from(&stored);
        if let Err(e) = self
            .ctx
            .store(self.ctx.conversation_repo().set_last_message(&conversation.id, &summary))
            .await
        {
            warn!(conversation_id = %conversation.id, error = %e, "Failed to update last message");
        }
        if let Err(e) = self
            .ctx
            .store(
                self.ctx
                    .conversation_repo()
                    .increment_unread(&conversation.id, request.recipient_id, 1),
            )
            .await
        {
            warn!(conversation_id = %conversation.id, error = %e, "Failed to bump unread counter");
        }
        NotificationDispatcher::new(self.ctx)
            .direct_message(&stored)
            .await;

        Ok(stored)
    }

    /// Post to a community. The sender must be an unmuted member, an admin
    /// when only admins may post, and outside the slow-mode window.
    #[instrument(skip(self, request))]
    pub async fn send_group(
        &self,
        sender_id: Snowflake,
        community_id: Snowflake,
        request: SendGroupRequest,
    ) -> ServiceResult<Message> {
        request.validate()?;
        let message = Message::group(self.ctx.generate_id(), sender_id, community_id, request.content)
            .with_attachments(request.attachments)
            .with_kind(request.kind)
            .with_link_preview(request.link_preview);
        message.validate(self.ctx.config().messaging.max_content_length)?;

        let community = PermissionService::new(self.ctx)
            .live_community(community_id)
            .await?;
        self.check_can_post(&community, sender_id).await?;

        let message = message.with_sender_name(self.sender_name(sender_id).await);
        let stored = self
            .ctx
            .store(self.ctx.message_repo().create(message))
            .await?;
        info!(
            message_id = %stored.id,
            community_id = %community_id,
            sender_id = %sender_id,
            "Community message sent"
        );

        let summary = MessageSummary::from(&stored);
        if let Err(e) = self
            .ctx
            .store(self.ctx.community_repo().set_last_message(community_id, &summary))
            .await
        {
            warn!(community_id = %community_id, error = %e, "Failed to update last message");
        }
        Ok(stored)
    }

    /// Link message to a user or a community; the URL is the content
    #[instrument(skip(self, preview))]
    pub async fn send_link(
        &self,
        sender_id: Snowflake,
        target: MessageTarget,
        url: &str,
        preview: Option<LinkPreview>,
    ) -> ServiceResult<Message> {
        let url = url.trim();
        if url.is_empty() {
            return Err(DomainError::ValidationError("link messages need a URL".into()).into());
        }
        match target {
            MessageTarget::Direct(recipient_id) => {
                let request = SendDirectRequest {
                    kind: MessageKind::Link,
                    link_preview: preview,
                    ..SendDirectRequest::text(recipient_id, url)
                };
                self.send_direct(sender_id, request).await
            }
            MessageTarget::Community(community_id) => {
                let request = SendGroupRequest {
                    kind: MessageKind::Link,
                    link_preview: preview,
                    ..SendGroupRequest::text(url)
                };
                self.send_group(sender_id, community_id, request).await
            }
        }
    }

    /// The newest `limit` messages in ascending order. Re-fetchable at any time.
    #[instrument(skip(self))]
    pub async fn fetch_history(
        &self,
        conversation_id: &ConversationId,
        viewer_id: Snowflake,
        query: HistoryQuery,
    ) -> ServiceResult<Vec<Message>> {
        authorize_reader(self.ctx, conversation_id, viewer_id).await?;
        let mut page = MessageQuery::latest(self.ctx.config().messaging.clamp_history(query.limit));
        if let Some(before) = query.before_sequence {
            page = page.before(before);
        }
        load_messages(self.ctx, conversation_id, page).await
    }

    /// SENT -> FAILED, by the sender only
    #[instrument(skip(self))]
    pub async fn mark_failed(&self, message_id: Snowflake, sender_id: Snowflake) -> ServiceResult<Message> {
        let message = self
            .ctx
            .store(self.ctx.message_repo().find_by_id(message_id))
            .await?
            .ok_or(DomainError::MessageNotFound(message_id))?;
        if message.sender_id != sender_id {
            return Err(DomainError::NotAuthorized("only the sender may mark a message failed".into()).into());
        }
        let failed = self
            .ctx
            .store(self.ctx.message_repo().mark_failed(message_id))
            .await?;
        info!(message_id = %message_id, sender_id = %sender_id, "Message marked failed");
        Ok(failed)
    }

    /// Applies the community's retention window; returns the number removed
    #[instrument(skip(self))]
    pub async fn prune_expired(&self, community_id: Snowflake, admin_id: Snowflake) -> ServiceResult<u64> {
        let community = PermissionService::new(self.ctx)
            .require_admin(community_id, admin_id)
            .await?;
        let Some(days) = community.settings.auto_delete else {
            return Ok(0);
        };

        let cutoff = self.ctx.now() - Duration::days(i64::from(days));
        let removed = self
            .ctx
            .store(
                self.ctx
                    .message_repo()
                    .delete_before(&ConversationId::community(community_id), cutoff),
            )
            .await?;
        info!(community_id = %community_id, removed, retention_days = days, "Expired messages pruned");
        Ok(removed)
    }

    async fn check_can_post(&self, community: &Community, sender_id: Snowflake) -> ServiceResult<()> {
        ensure_member(community, sender_id)?;
        let now = self.ctx.now();
        if let Some(mute) = community.active_mute(sender_id, now) {
            return Err(DomainError::UserMuted { until: mute.ends_at }.into());
        }

        let admin = is_authorized_admin(community, sender_id);
        if community.permissions.only_admins_can_post && !admin {
            return Err(DomainError::AdminsOnlyPosting.into());
        }

        let enforce = !admin && self.ctx.config().messaging.enforce_slow_mode;
        if let Some(secs) = community.settings.slow_mode.filter(|secs| enforce && *secs > 0) {
            let conversation_id = ConversationId::community(community.id);
            let previous = self
                .ctx
                .store(self.ctx.message_repo().last_sent_by(&conversation_id, sender_id))
                .await?;
            if let Some(previous) = previous {
                let elapsed = now - previous.created_at;
                let interval = Duration::seconds(i64::from(secs));
                if elapsed < interval {
                    let remaining = interval - elapsed;
                    // round up so a retry after the hint always succeeds
                    let retry_after_secs = (remaining.num_milliseconds() + 999) / 1000;
                    return Err(DomainError::SlowModeActive { retry_after_secs }.into());
                }
            }
        }
        Ok(())
    }

    /// Display name captured at send time; lookup failures leave it empty
    async fn sender_name(&self, sender_id: Snowflake) -> Option<String> {
        match self.ctx.store(self.ctx.user_directory().find_by_id(sender_id)).await {
            Ok(profile) => profile.map(|p| p.label().to_string()),
            Err(e) => {
                warn!(sender_id = %sender_id, error = %e, "Sender lookup failed");
                None
            }
        }
    }
}

/// Direct conversations are readable by their participants, community
/// conversations by current members
pub(crate) async fn authorize_reader(
    ctx: &ServiceContext,
    conversation_id: &ConversationId,
    viewer_id: Snowflake,
) -> ServiceResult<()> {
    match conversation_id.community_id() {
        Some(community_id) => {
            PermissionService::new(ctx)
                .require_member(community_id, viewer_id)
                .await?;
        }
        None => ensure_participant(conversation_id, viewer_id)?,
    }
    Ok(())
}

/// Direct conversations without a stored record fall back to matching on
/// the sender and recipient pair
pub(crate) async fn load_messages(
    ctx: &ServiceContext,
    conversation_id: &ConversationId,
    query: MessageQuery,
) -> ServiceResult<Vec<Message>> {
    if let Some((low, high)) = conversation_id.participants() {
        let known = ctx
            .store(ctx.conversation_repo().find_by_id(conversation_id))
            .await?
            .is_some();
        if !known {
            return ctx.store(ctx.message_repo().find_between(low, high, query)).await;
        }
    }
    ctx.store(ctx.message_repo().find_by_conversation(conversation_id, query))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{MuteRequest, UpdateSettingsRequest};
    use crate::services::community::CommunityService;
    use crate::services::moderation::ModerationService;
    use crate::services::test_support::{Harness, ADMIN, CREATOR, MEMBER, OUTSIDER};
    use circle_core::{ConversationRepository, MessageStatus, NotificationRepository};

    async fn enable_slow_mode(h: &Harness, community_id: Snowflake, secs: u32) {
        let request = UpdateSettingsRequest {
            slow_mode_secs: Some(secs),
            ..Default::default()
        };
        CommunityService::new(&h.ctx)
            .update_settings(community_id, CREATOR, request)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_direct_message_opens_conversation() {
        let h = Harness::new();
        let service = MessageService::new(&h.ctx);

        let sent = service
            .send_direct(MEMBER, SendDirectRequest::text(ADMIN, "hi"))
            .await
            .unwrap();
        assert_eq!(sent.sequence, 1);
        assert_eq!(sent.status, MessageStatus::Sent);

        let id = ConversationId::direct(ADMIN, MEMBER).unwrap();
        assert_eq!(sent.conversation_id, id);
        let conversation = h.store.conversations.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(conversation.unread_for(ADMIN), 1);
        assert_eq!(conversation.unread_for(MEMBER), 0);
        assert_eq!(conversation.last_message.unwrap().preview, "hi");

        let inbox = h.store.notifications.find_by_user(ADMIN, true, 10).await.unwrap();
        assert_eq!(inbox.len(), 1);
    }

    #[tokio::test]
    async fn test_direct_message_to_self_rejected() {
        let h = Harness::new();
        let err = MessageService::new(&h.ctx)
            .send_direct(MEMBER, SendDirectRequest::text(MEMBER, "me"))
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::SelfConversation)));
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let h = Harness::new();
        let community = h.community(true).await;
        let err = MessageService::new(&h.ctx)
            .send_group(MEMBER, community.id, SendGroupRequest::text("   "))
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::EmptyMessage)));
    }

    #[tokio::test]
    async fn test_non_member_cannot_post() {
        let h = Harness::new();
        let community = h.community(true).await;
        let err = MessageService::new(&h.ctx)
            .send_group(OUTSIDER, community.id, SendGroupRequest::text("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotMember(_))));
    }

    #[tokio::test]
    async fn test_slow_mode_reports_retry_after() {
        let h = Harness::new();
        let community = h.community(true).await;
        enable_slow_mode(&h, community.id, 30).await;
        let service = MessageService::new(&h.ctx);

        service
            .send_group(MEMBER, community.id, SendGroupRequest::text("first"))
            .await
            .unwrap();
        h.clock.advance(chrono::Duration::seconds(10));

        let err = service
            .send_group(MEMBER, community.id, SendGroupRequest::text("second"))
            .await
            .unwrap_err();
        match err.domain() {
            Some(DomainError::SlowModeActive { retry_after_secs }) => assert_eq!(*retry_after_secs, 20),
            other => panic!("unexpected: {other:?}"),
        }

        // admins are exempt
        service
            .send_group(ADMIN, community.id, SendGroupRequest::text("a"))
            .await
            .unwrap();
        service
            .send_group(ADMIN, community.id, SendGroupRequest::text("b"))
            .await
            .unwrap();

        h.clock.advance(chrono::Duration::seconds(20));
        service
            .send_group(MEMBER, community.id, SendGroupRequest::text("second"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_muted_member_cannot_post_until_expiry() {
        let h = Harness::new();
        let community = h.community(true).await;
        ModerationService::new(&h.ctx)
            .mute(community.id, MEMBER, ADMIN, MuteRequest::minutes(5))
            .await
            .unwrap();
        let service = MessageService::new(&h.ctx);

        let err = service
            .send_group(MEMBER, community.id, SendGroupRequest::text("hey"))
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::UserMuted { .. })));

        h.clock.advance(chrono::Duration::minutes(6));
        service
            .send_group(MEMBER, community.id, SendGroupRequest::text("hey"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_admins_only_posting() {
        let h = Harness::new();
        let community = h.community(true).await;
        let request = UpdateSettingsRequest {
            only_admins_can_post: Some(true),
            ..Default::default()
        };
        CommunityService::new(&h.ctx)
            .update_settings(community.id, ADMIN, request)
            .await
            .unwrap();
        let service = MessageService::new(&h.ctx);

        let err = service
            .send_group(MEMBER, community.id, SendGroupRequest::text("x"))
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::AdminsOnlyPosting)));
        service
            .send_group(ADMIN, community.id, SendGroupRequest::text("x"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_history_is_ascending_and_member_only() {
        let h = Harness::new();
        let community = h.community(true).await;
        let service = MessageService::new(&h.ctx);
        for text in ["one", "two", "three"] {
            service
                .send_group(MEMBER, community.id, SendGroupRequest::text(text))
                .await
                .unwrap();
        }

        let id = ConversationId::community(community.id);
        let history = service
            .fetch_history(&id, ADMIN, HistoryQuery::latest(2))
            .await
            .unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["two", "three"]);
        assert_eq!(history[0].sender_name.as_deref(), Some("member"));

        let err = service
            .fetch_history(&id, OUTSIDER, HistoryQuery::latest(2))
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotMember(_))));
    }

    #[tokio::test]
    async fn test_only_sender_marks_failed() {
        let h = Harness::new();
        let service = MessageService::new(&h.ctx);
        let sent = service
            .send_direct(MEMBER, SendDirectRequest::text(ADMIN, "lost"))
            .await
            .unwrap();

        let err = service.mark_failed(sent.id, ADMIN).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotAuthorized(_))));

        let failed = service.mark_failed(sent.id, MEMBER).await.unwrap();
        assert_eq!(failed.status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn test_link_needs_a_url() {
        let h = Harness::new();
        let community = h.community(true).await;
        let service = MessageService::new(&h.ctx);

        for url in ["", "   "] {
            let err = service
                .send_link(MEMBER, MessageTarget::Community(community.id), url, None)
                .await
                .unwrap_err();
            assert!(matches!(err.domain(), Some(DomainError::ValidationError(_))));
        }

        let sent = service
            .send_link(MEMBER, MessageTarget::Direct(ADMIN), " https://example.org/x ", None)
            .await
            .unwrap();
        assert_eq!(sent.kind, MessageKind::Link);
        assert_eq!(sent.content, "https://example.org/x");
    }

    #[tokio::test]
    async fn test_prune_removes_only_messages_past_retention() {
        let h = Harness::new();
        let community = h.community(true).await;
        let service = MessageService::new(&h.ctx);
        assert_eq!(service.prune_expired(community.id, ADMIN).await.unwrap(), 0);

        let request = UpdateSettingsRequest {
            auto_delete_days: Some(1),
            ..Default::default()
        };
        CommunityService::new(&h.ctx)
            .update_settings(community.id, CREATOR, request)
            .await
            .unwrap();

        service
            .send_group(MEMBER, community.id, SendGroupRequest::text("old"))
            .await
            .unwrap();
        h.clock.advance(Duration::hours(25));
        service
            .send_group(MEMBER, community.id, SendGroupRequest::text("fresh"))
            .await
            .unwrap();

        let err = service.prune_expired(community.id, MEMBER).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotAuthorized(_))));

        assert_eq!(service.prune_expired(community.id, ADMIN).await.unwrap(), 1);
        let history = service
            .fetch_history(&ConversationId::community(community.id), MEMBER, HistoryQuery::latest(10))
            .await
            .unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["fresh"]);
    }
}
