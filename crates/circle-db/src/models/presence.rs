//! Presence database model

use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, FromRow)]
pub struct PresenceModel {
    pub user_id: i64,
    pub online: bool,
    pub last_seen: DateTime<Utc>,
}
