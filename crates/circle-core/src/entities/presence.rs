//! Online presence of a user

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub user_id: Snowflake,
    pub online: bool,
    pub last_seen: DateTime<Utc>,
}

impl Presence {
    pub fn online(user_id: Snowflake, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            online: true,
            last_seen: now,
        }
    }

    pub fn offline(user_id: Snowflake, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            online: false,
            last_seen: now,
        }
    }
}
