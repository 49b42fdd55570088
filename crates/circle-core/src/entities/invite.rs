//! Invite code - a short token granting membership to its community

use chrono::{DateTime, Duration, Utc};

use crate::error::DomainError;
use crate::value_objects::Snowflake;

/// Uppercase letters and digits without the look-alikes I, O, 0 and 1
pub const INVITE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const INVITE_CODE_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteCode {
    pub code: String,
    pub community_id: Snowflake,
    pub created_by: Snowflake,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Zero means unlimited
    pub usage_limit: u32,
    pub usage_count: u32,
}

impl InviteCode {
    pub fn new(
        code: String,
        community_id: Snowflake,
        created_by: Snowflake,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            code,
            community_id,
            created_by,
            created_at,
            expires_at: None,
            usage_limit: 0,
            usage_count: 0,
        }
    }

    /// Non-positive durations, and lifetimes running past the representable
    /// calendar, leave the code without an expiry
    pub fn with_expiry(mut self, lifetime: Duration) -> Self {
        self.expires_at = (lifetime > Duration::zero())
            .then(|| self.created_at.checked_add_signed(lifetime))
            .flatten();
        self
    }

    pub fn with_usage_limit(mut self, usage_limit: u32) -> Self {
        self.usage_limit = usage_limit;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_limit != 0 && self.usage_count >= self.usage_limit
    }

    /// Valid iff not expired and (limit == 0 or count < limit)
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && !self.is_exhausted()
    }

    /// `None` for unlimited codes
    pub fn remaining_uses(&self) -> Option<u32> {
        (self.usage_limit != 0).then(|| self.usage_limit.saturating_sub(self.usage_count))
    }

    /// Expiry is reported before exhaustion
    pub fn check_redeemable(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.is_expired(now) {
            return Err(DomainError::InviteExpired);
        }
        if self.is_exhausted() {
            return Err(DomainError::InviteUsageExceeded);
        }
        Ok(())
    }

    pub fn matches(&self, code: &str) -> bool {
        self.code == normalize_invite_code(code)
    }
}

/// Random code drawn from [`INVITE_ALPHABET`]
pub fn generate_invite_code() -> String {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    (0..INVITE_CODE_LEN)
        .map(|_| INVITE_ALPHABET[rng.gen_range(0..INVITE_ALPHABET.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively and ignoring surrounding whitespace
pub fn normalize_invite_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

pub fn is_well_formed_invite_code(code: &str) -> bool {
    code.len() == INVITE_CODE_LEN && code.bytes().all(|b| INVITE_ALPHABET.contains(&b))
}
