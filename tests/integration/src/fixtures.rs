//! Test fixtures and data generators
//!
//! Provides the seeded users and reusable requests for integration tests.

use std::sync::atomic::{AtomicU64, Ordering};

use circle_core::Snowflake;
use circle_service::dto::CreateCommunityRequest;

pub const U1: Snowflake = Snowflake::new(1);
pub const U2: Snowflake = Snowflake::new(2);
pub const U3: Snowflake = Snowflake::new(3);
pub const U4: Snowflake = Snowflake::new(4);
pub const U5: Snowflake = Snowflake::new(5);
pub const U6: Snowflake = Snowflake::new(6);
pub const U7: Snowflake = Snowflake::new(7);
pub const U8: Snowflake = Snowflake::new(8);

/// Every user present in the harness directory
pub const USERS: [Snowflake; 8] = [U1, U2, U3, U4, U5, U6, U7, U8];

/// Counter for unique test data
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Get a unique suffix for test data
pub fn unique_suffix() -> u64 {
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

pub fn username(user_id: Snowflake) -> String {
    format!("user{user_id}")
}

/// A uniquely named community request
pub fn community_request(public: bool) -> CreateCommunityRequest {
    let request = CreateCommunityRequest::new(format!("community {}", unique_suffix()));
    if public {
        request
    } else {
        request.private()
    }
}
