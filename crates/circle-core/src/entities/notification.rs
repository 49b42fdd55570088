//! Notifications handed to the notification sink

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::value_objects::Snowflake;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    JoinRequest,
    JoinApproved,
    JoinRejected,
    AddedToCommunity,
    Promoted,
    Banned,
    Muted,
    DirectMessage,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JoinRequest => "join_request",
            Self::JoinApproved => "join_approved",
            Self::JoinRejected => "join_rejected",
            Self::AddedToCommunity => "added_to_community",
            Self::Promoted => "promoted",
            Self::Banned => "banned",
            Self::Muted => "muted",
            Self::DirectMessage => "direct_message",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "join_request" => Some(Self::JoinRequest),
            "join_approved" => Some(Self::JoinApproved),
            "join_rejected" => Some(Self::JoinRejected),
            "added_to_community" => Some(Self::AddedToCommunity),
            "promoted" => Some(Self::Promoted),
            "banned" => Some(Self::Banned),
            "muted" => Some(Self::Muted),
            "direct_message" => Some(Self::DirectMessage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Snowflake,
    pub user_id: Snowflake,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    pub fn new(
        id: Snowflake,
        user_id: Snowflake,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            title: title.into(),
            body: body.into(),
            kind,
            data: Map::new(),
            created_at,
            read: false,
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}
