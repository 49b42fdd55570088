//! Live subscriptions
//!
//! A subscription watches one feed topic. Every change wakes a background
//! task that re-queries and hands the listener the full current result, not
//! a diff. Wake-ups are coalesced: a burst of writes leads to at least one
//! reload after the last write.

use std::future::Future;
use std::sync::Arc;

use circle_core::{
    ConversationId, FeedTopic, Message, MessageQuery, Notification, Presence, Snowflake,
    StoreEvent, Subscription,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use super::context::ServiceContext;
use super::error::ServiceResult;
use super::message::{authorize_reader, load_messages};
use super::notification::NotificationDispatcher;

struct Active {
    watch: Subscription,
    task: JoinHandle<()>,
}

/// Handle to a live subscription.
///
/// `cancel` is idempotent; dropping the handle cancels it too.
pub struct SubscriptionHandle {
    topic: FeedTopic,
    active: Mutex<Option<Active>>,
}

impl SubscriptionHandle {
    fn new(topic: FeedTopic, watch: Subscription, task: JoinHandle<()>) -> Self {
        Self {
            topic,
            active: Mutex::new(Some(Active { watch, task })),
        }
    }

    pub fn topic(&self) -> FeedTopic {
        self.topic
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn cancel(&self) {
        let Some(active) = self.active.lock().take() else {
            return;
        };
        active.watch.cancel();
        active.task.abort();
        debug!(topic = %self.topic.name(), "Subscription cancelled");
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Subscription service
pub struct SubscriptionService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> SubscriptionService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Latest messages of a conversation, ascending, on every change.
    /// The first snapshot is delivered before this returns.
    #[instrument(skip(self, callback))]
    pub async fn subscribe<F>(
        &self,
        conversation_id: ConversationId,
        viewer_id: Snowflake,
        callback: F,
    ) -> ServiceResult<SubscriptionHandle>
    where
        F: Fn(Vec<Message>) + Send + Sync + 'static,
    {
        authorize_reader(self.ctx, &conversation_id, viewer_id).await?;
        let query = MessageQuery::latest(self.ctx.config().messaging.history_limit);
        let ctx = self.ctx.clone();
        self.start(
            FeedTopic::Conversation(conversation_id),
            move || {
                let ctx = ctx.clone();
                async move { load_messages(&ctx, &conversation_id, query).await }
            },
            callback,
        )
        .await
    }

    #[instrument(skip(self, callback))]
    pub async fn subscribe_presence<F>(
        &self,
        user_id: Snowflake,
        callback: F,
    ) -> ServiceResult<SubscriptionHandle>
    where
        F: Fn(Option<Presence>) + Send + Sync + 'static,
    {
        let ctx = self.ctx.clone();
        self.start(
            FeedTopic::Presence(user_id),
            move || {
                let ctx = ctx.clone();
                async move { ctx.store(ctx.presence_repo().get(user_id)).await }
            },
            callback,
        )
        .await
    }

    /// Unread notifications, newest first
    #[instrument(skip(self, callback))]
    pub async fn subscribe_notifications<F>(
        &self,
        user_id: Snowflake,
        callback: F,
    ) -> ServiceResult<SubscriptionHandle>
    where
        F: Fn(Vec<Notification>) + Send + Sync + 'static,
    {
        let limit = self.ctx.config().messaging.history_limit;
        let ctx = self.ctx.clone();
        self.start(
            FeedTopic::Notifications(user_id),
            move || {
                let ctx = ctx.clone();
                async move {
                    NotificationDispatcher::new(&ctx)
                        .inbox(user_id, true, limit)
                        .await
                }
            },
            callback,
        )
        .await
    }

    async fn start<T, L, Fut, F>(
        &self,
        topic: FeedTopic,
        load: L,
        callback: F,
    ) -> ServiceResult<SubscriptionHandle>
    where
        T: Send + 'static,
        L: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult<T>> + Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let (wake, mut woken) = mpsc::channel::<()>(1);
        // watch before the first load so no change in between is lost
        let watch = self.ctx.feed().watch(
            topic,
            Arc::new(move |_: &StoreEvent| {
                // a full channel already holds a pending reload
                let _ = wake.try_send(());
            }),
        );

        callback(load().await?);

        let task = tokio::spawn(async move {
            while woken.recv().await.is_some() {
                match load().await {
                    Ok(snapshot) => callback(snapshot),
                    Err(e) => warn!(topic = %topic.name(), error = %e, "Subscription reload failed"),
                }
            }
        });
        debug!(topic = %topic.name(), "Subscription started");
        Ok(SubscriptionHandle::new(topic, watch, task))
    }
}
