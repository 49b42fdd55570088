//! Join requests and moderation records attached to a community

use chrono::{DateTime, Duration, Utc};

use crate::error::DomainError;
use crate::value_objects::Snowflake;

/// A pending ask to join a community that requires approval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinRequest {
    pub user_id: Snowflake,
    pub requested_at: DateTime<Utc>,
}

impl JoinRequest {
    pub fn new(user_id: Snowflake, requested_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            requested_at,
        }
    }
}

/// Permanent removal until explicitly lifted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanRecord {
    pub user_id: Snowflake,
    pub moderator_id: Snowflake,
    pub banned_at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl BanRecord {
    pub fn new(
        user_id: Snowflake,
        moderator_id: Snowflake,
        banned_at: DateTime<Utc>,
        reason: Option<String>,
    ) -> Self {
        Self {
            user_id,
            moderator_id,
            banned_at,
            reason: normalize_reason(reason),
        }
    }
}

/// Time-bounded posting restriction; membership is untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuteRecord {
    pub user_id: Snowflake,
    pub moderator_id: Snowflake,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl MuteRecord {
    pub fn new(
        user_id: Snowflake,
        moderator_id: Snowflake,
        started_at: DateTime<Utc>,
        duration: Duration,
        reason: Option<String>,
    ) -> Self {
        Self {
            user_id,
            moderator_id,
            started_at,
            // saturate instead of overflowing past the calendar's end
            ends_at: started_at
                .checked_add_signed(duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            reason: normalize_reason(reason),
        }
    }

    #[inline]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.ends_at
    }

    /// Time left on the mute, zero once it has lapsed
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.ends_at - now).max(Duration::zero())
    }

    /// Rejects records loaded from storage whose window is empty or inverted
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.ends_at <= self.started_at {
            return Err(DomainError::ValidationError(format!(
                "mute for {} ends before it starts",
                self.user_id
            )));
        }
        Ok(())
    }
}

fn normalize_reason(reason: Option<String>) -> Option<String> {
    reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
}
