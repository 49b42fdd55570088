//! Service context - dependency container for services
//!
//! Holds the ports, the clock, the id generator and the engine settings.
//! Cloning is cheap; subscriptions clone it into their background tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use circle_common::EngineConfig;
use circle_core::{
    ChangeFeed, Clock, CommunityRepository, ConversationRepository, DomainError,
    MessageRepository, NotificationRepository, NotificationSink, PresenceRepository, RepoResult,
    Snowflake, SnowflakeGenerator, SystemClock, UserDirectory,
};

use super::error::{ServiceError, ServiceResult};

/// Service context containing all dependencies
#[derive(Clone)]
pub struct ServiceContext {
    // Repositories
    community_repo: Arc<dyn CommunityRepository>,
    conversation_repo: Arc<dyn ConversationRepository>,
    message_repo: Arc<dyn MessageRepository>,
    presence_repo: Arc<dyn PresenceRepository>,
    user_directory: Arc<dyn UserDirectory>,

    // Notifications
    notification_sink: Arc<dyn NotificationSink>,
    notification_repo: Option<Arc<dyn NotificationRepository>>,

    // Change feed
    feed: Arc<dyn ChangeFeed>,

    clock: Arc<dyn Clock>,
    snowflake_generator: Arc<SnowflakeGenerator>,
    config: Arc<EngineConfig>,
}

impl ServiceContext {
    // === Repositories ===

    pub fn community_repo(&self) -> &dyn CommunityRepository {
        self.community_repo.as_ref()
    }

    pub fn conversation_repo(&self) -> &dyn ConversationRepository {
        self.conversation_repo.as_ref()
    }

    pub fn message_repo(&self) -> &dyn MessageRepository {
        self.message_repo.as_ref()
    }

    pub fn presence_repo(&self) -> &dyn PresenceRepository {
        self.presence_repo.as_ref()
    }

    pub fn user_directory(&self) -> &dyn UserDirectory {
        self.user_directory.as_ref()
    }

    // === Notifications ===

    pub fn notification_sink(&self) -> &dyn NotificationSink {
        self.notification_sink.as_ref()
    }

    /// Present only when the sink also keeps delivered notifications
    pub fn notification_repo(&self) -> Option<&dyn NotificationRepository> {
        self.notification_repo.as_deref()
    }

    // === Change feed ===

    pub fn feed(&self) -> &dyn ChangeFeed {
        self.feed.as_ref()
    }

    // === Time, ids, settings ===

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Generate a new Snowflake ID
    pub fn generate_id(&self) -> Snowflake {
        self.snowflake_generator.generate()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store_timeout(&self) -> Duration {
        self.config.engine.store_timeout()
    }

    /// Await a store call, bounded by the configured store timeout.
    /// An expired call is reported as a store failure.
    pub async fn store<T, F>(&self, call: F) -> ServiceResult<T>
    where
        F: Future<Output = RepoResult<T>>,
    {
        match tokio::time::timeout(self.store_timeout(), call).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => {
                tracing::warn!(timeout_ms = self.config.engine.store_timeout_ms, "Store call timed out");
                Err(DomainError::StoreFailure("timed out".into()).into())
            }
        }
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("repositories", &"...")
            .field("notification_repo", &self.notification_repo.is_some())
            .field("app", &self.config.app.name)
            .finish()
    }
}

/// Builder for creating ServiceContext
pub struct ServiceContextBuilder {
    community_repo: Option<Arc<dyn CommunityRepository>>,
    conversation_repo: Option<Arc<dyn ConversationRepository>>,
    message_repo: Option<Arc<dyn MessageRepository>>,
    presence_repo: Option<Arc<dyn PresenceRepository>>,
    user_directory: Option<Arc<dyn UserDirectory>>,
    notification_sink: Option<Arc<dyn NotificationSink>>,
    notification_repo: Option<Arc<dyn NotificationRepository>>,
    feed: Option<Arc<dyn ChangeFeed>>,
    clock: Option<Arc<dyn Clock>>,
    snowflake_generator: Option<Arc<SnowflakeGenerator>>,
    config: Option<EngineConfig>,
}

impl ServiceContextBuilder {
    pub fn new() -> Self {
        Self {
            community_repo: None,
            conversation_repo: None,
            message_repo: None,
            presence_repo: None,
            user_directory: None,
            notification_sink: None,
            notification_repo: None,
            feed: None,
            clock: None,
            snowflake_generator: None,
            config: None,
        }
    }

    pub fn community_repo(mut self, repo: Arc<dyn CommunityRepository>) -> Self {
        self.community_repo = Some(repo);
        self
    }

    pub fn conversation_repo(mut self, repo: Arc<dyn ConversationRepository>) -> Self {
        self.conversation_repo = Some(repo);
        self
    }

    pub fn message_repo(mut self, repo: Arc<dyn MessageRepository>) -> Self {
        self.message_repo = Some(repo);
        self
    }

    pub fn presence_repo(mut self, repo: Arc<dyn PresenceRepository>) -> Self {
        self.presence_repo = Some(repo);
        self
    }

    pub fn user_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.user_directory = Some(directory);
        self
    }

    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    pub fn notification_repo(mut self, repo: Arc<dyn NotificationRepository>) -> Self {
        self.notification_repo = Some(repo);
        self
    }

    pub fn feed(mut self, feed: Arc<dyn ChangeFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Defaults to the system clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to a generator seeded with the configured worker id
    pub fn snowflake_generator(mut self, generator: Arc<SnowflakeGenerator>) -> Self {
        self.snowflake_generator = Some(generator);
        self
    }

    /// Defaults to `EngineConfig::default()`
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the ServiceContext
    ///
    /// # Errors
    /// Returns `ServiceError::Validation` if any required port is missing
    pub fn build(self) -> ServiceResult<ServiceContext> {
        let config = self.config.unwrap_or_default();
        let snowflake_generator = self
            .snowflake_generator
            .unwrap_or_else(|| Arc::new(SnowflakeGenerator::new(config.engine.worker_id)));

        Ok(ServiceContext {
            community_repo: self
                .community_repo
                .ok_or_else(|| ServiceError::validation("community_repo is required"))?,
            conversation_repo: self
                .conversation_repo
                .ok_or_else(|| ServiceError::validation("conversation_repo is required"))?,
            message_repo: self
                .message_repo
                .ok_or_else(|| ServiceError::validation("message_repo is required"))?,
            presence_repo: self
                .presence_repo
                .ok_or_else(|| ServiceError::validation("presence_repo is required"))?,
            user_directory: self
                .user_directory
                .ok_or_else(|| ServiceError::validation("user_directory is required"))?,
            notification_sink: self
                .notification_sink
                .ok_or_else(|| ServiceError::validation("notification_sink is required"))?,
            notification_repo: self.notification_repo,
            feed: self
                .feed
                .ok_or_else(|| ServiceError::validation("feed is required"))?,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            snowflake_generator,
            config: Arc::new(config),
        })
    }
}

impl Default for ServiceContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
