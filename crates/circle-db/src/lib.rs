//! # circle-db
//!
//! PostgreSQL document store implementing the `circle-core` repository ports
//! with SQLx.
//!
//! ## Overview
//!
//! - Connection pool management and embedded migrations
//! - Database models with SQLx `FromRow` derives
//! - Entity ↔ Model mappers
//! - Repository implementations that publish every committed write to a
//!   [`ChangeFeed`](circle_core::ChangeFeed)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use circle_core::SystemClock;
//! use circle_db::{create_pool_from_env, run_migrations, PgStore};
//! use circle_store::ChangeHub;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = create_pool_from_env().await?;
//!     run_migrations(&pool).await?;
//!     let store = PgStore::new(pool, ChangeHub::new_shared(), Arc::new(SystemClock));
//!     // Hand the repositories to a ServiceContext...
//!     Ok(())
//! }
//! ```

pub mod mappers;
pub mod models;
pub mod pool;
pub mod repositories;

use std::sync::Arc;

use circle_core::{ChangeFeed, Clock};

// Re-export commonly used types
pub use pool::{create_pool, create_pool_from_env, run_migrations, PgPool, PoolConfig};
pub use repositories::{
    PgCommunityRepository, PgConversationRepository, PgMessageRepository, PgNotificationStore,
    PgPresenceRepository, PgUserDirectory,
};

/// Every PostgreSQL repository sharing one pool, feed and clock
#[derive(Clone)]
pub struct PgStore {
    pub pool: PgPool,
    pub communities: Arc<PgCommunityRepository>,
    pub conversations: Arc<PgConversationRepository>,
    pub messages: Arc<PgMessageRepository>,
    pub notifications: Arc<PgNotificationStore>,
    pub presence: Arc<PgPresenceRepository>,
    pub users: Arc<PgUserDirectory>,
}

impl PgStore {
    pub fn new(pool: PgPool, feed: Arc<dyn ChangeFeed>, clock: Arc<dyn Clock>) -> Self {
        Self {
            communities: Arc::new(PgCommunityRepository::new(
                pool.clone(),
                feed.clone(),
                clock.clone(),
            )),
            conversations: Arc::new(PgConversationRepository::new(
                pool.clone(),
                feed.clone(),
                clock.clone(),
            )),
            messages: Arc::new(PgMessageRepository::new(pool.clone(), feed.clone(), clock.clone())),
            notifications: Arc::new(PgNotificationStore::new(pool.clone(), feed.clone(), clock)),
            presence: Arc::new(PgPresenceRepository::new(pool.clone(), feed)),
            users: Arc::new(PgUserDirectory::new(pool.clone())),
            pool,
        }
    }
}
