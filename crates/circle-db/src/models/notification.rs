//! Notification database model

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::FromRow;

/// Database model for notifications table
#[derive(Debug, Clone, FromRow)]
pub struct NotificationModel {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub body: String,
    pub kind: String,
    pub data: Json<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}
