//! Notification dispatcher
//!
//! Turns membership and messaging events into notification-sink calls.
//! Dispatch is a secondary effect: failures are logged and never reach the
//! caller of the primary operation.

use circle_core::{
    Community, DomainError, Message, Notification, NotificationKind, Snowflake,
};
use futures::future::join_all;
use tracing::{debug, instrument, warn};

use super::context::ServiceContext;
use super::error::ServiceResult;

/// Notification dispatcher
pub struct NotificationDispatcher<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> NotificationDispatcher<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    fn build(
        &self,
        user_id: Snowflake,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Notification {
        Notification::new(self.ctx.generate_id(), user_id, kind, title, body, self.ctx.now())
    }

    fn for_community(
        &self,
        community: &Community,
        user_id: Snowflake,
        kind: NotificationKind,
        body: String,
    ) -> Notification {
        self.build(user_id, kind, community.name.clone(), body)
            .with_data("community_id", community.id.to_string())
    }

    async fn send(&self, notification: Notification) {
        let user_id = notification.user_id;
        let kind = notification.kind;
        match self.ctx.store(self.ctx.notification_sink().notify(&notification)).await {
            Ok(()) => debug!(user_id = %user_id, kind = kind.as_str(), "Notification dispatched"),
            Err(e) => warn!(
                user_id = %user_id,
                kind = kind.as_str(),
                error = %e,
                "Failed to dispatch notification"
            ),
        }
    }

    async fn send_all(&self, notifications: Vec<Notification>) {
        join_all(notifications.into_iter().map(|n| self.send(n))).await;
    }

    async fn display_name(&self, user_id: Snowflake) -> String {
        match self.ctx.store(self.ctx.user_directory().find_by_id(user_id)).await {
            Ok(Some(profile)) => profile.label().to_string(),
            Ok(None) => user_id.to_string(),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "User lookup failed");
                user_id.to_string()
            }
        }
    }

    /// Every admin and the creator hear about a new join request
    #[instrument(skip(self, community), fields(community_id = %community.id))]
    pub async fn join_requested(&self, community: &Community, requester_id: Snowflake) {
        let name = self.display_name(requester_id).await;
        let body = format!("{name} asked to join");
        let notifications = community
            .moderators()
            .into_iter()
            .map(|admin_id| {
                self.for_community(community, admin_id, NotificationKind::JoinRequest, body.clone())
                    .with_data("requester_id", requester_id.to_string())
            })
            .collect();
        self.send_all(notifications).await;
    }

    pub async fn join_approved(&self, community: &Community, user_id: Snowflake) {
        let body = format!("Your request to join {} was approved", community.name);
        self.send(self.for_community(community, user_id, NotificationKind::JoinApproved, body))
            .await;
    }

    pub async fn join_rejected(&self, community: &Community, user_id: Snowflake) {
        let body = format!("Your request to join {} was declined", community.name);
        self.send(self.for_community(community, user_id, NotificationKind::JoinRejected, body))
            .await;
    }

    pub async fn added(&self, community: &Community, user_ids: &[Snowflake], actor_id: Snowflake) {
        let name = self.display_name(actor_id).await;
        let body = format!("{name} added you to {}", community.name);
        let notifications = user_ids
            .iter()
            .map(|user_id| {
                self.for_community(community, *user_id, NotificationKind::AddedToCommunity, body.clone())
            })
            .collect();
        self.send_all(notifications).await;
    }

    pub async fn promoted(&self, community: &Community, user_id: Snowflake) {
        let body = format!("You are now an admin of {}", community.name);
        self.send(self.for_community(community, user_id, NotificationKind::Promoted, body))
            .await;
    }

    pub async fn banned(&self, community: &Community, user_id: Snowflake, reason: Option<&str>) {
        let body = match reason {
            Some(reason) => format!("You were banned from {}: {reason}", community.name),
            None => format!("You were banned from {}", community.name),
        };
        self.send(self.for_community(community, user_id, NotificationKind::Banned, body))
            .await;
    }

    pub async fn muted(&self, community: &Community, user_id: Snowflake, minutes: i64) {
        let body = format!("You were muted in {} for {minutes} minutes", community.name);
        self.send(
            self.for_community(community, user_id, NotificationKind::Muted, body)
                .with_data("duration_minutes", minutes),
        )
        .await;
    }

    pub async fn direct_message(&self, message: &Message) {
        let Some(recipient_id) = message.recipient_id() else {
            return;
        };
        let sender = self.display_name(message.sender_id).await;
        let body = if message.content.trim().is_empty() {
            "Sent an attachment".to_string()
        } else {
            message.content.chars().take(120).collect()
        };
        let notification = self
            .build(recipient_id, NotificationKind::DirectMessage, sender, body)
            .with_data("conversation_id", message.conversation_id.to_string())
            .with_data("message_id", message.id.to_string());
        self.send(notification).await;
    }

    // === Inbox ===

    /// Newest first. Needs a sink that keeps delivered notifications.
    #[instrument(skip(self))]
    pub async fn inbox(
        &self,
        user_id: Snowflake,
        unread_only: bool,
        limit: usize,
    ) -> ServiceResult<Vec<Notification>> {
        let repo = self.repo()?;
        self.ctx
            .store(repo.find_by_user(user_id, unread_only, limit))
            .await
    }

    pub async fn mark_read(&self, user_id: Snowflake, notification_id: Snowflake) -> ServiceResult<bool> {
        let repo = self.repo()?;
        self.ctx.store(repo.mark_read(user_id, notification_id)).await
    }

    pub async fn unread_count(&self, user_id: Snowflake) -> ServiceResult<i64> {
        let repo = self.repo()?;
        self.ctx.store(repo.unread_count(user_id)).await
    }

    fn repo(&self) -> Result<&'a dyn circle_core::NotificationRepository, DomainError> {
        self.ctx
            .notification_repo()
            .ok_or_else(|| DomainError::StoreFailure("notification inbox is not configured".into()))
    }
}
