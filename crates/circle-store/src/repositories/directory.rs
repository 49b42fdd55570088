//! In-memory user directory

use async_trait::async_trait;
use circle_core::{RepoResult, Snowflake, UserDirectory, UserProfile};
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryUserDirectory {
    users: DashMap<Snowflake, UserProfile>,
    by_username: DashMap<String, Snowflake>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile. Usernames are matched case-insensitively.
    pub fn insert(&self, profile: UserProfile) {
        if let Some(previous) = self.users.get(&profile.id).map(|p| p.username.to_lowercase()) {
            self.by_username.remove(&previous);
        }
        self.by_username
            .insert(profile.username.to_lowercase(), profile.id);
        self.users.insert(profile.id, profile);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_id(&self, id: Snowflake) -> RepoResult<Option<UserProfile>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_by_username(&self, username: &str) -> RepoResult<Option<UserProfile>> {
        let Some(id) = self.by_username.get(&username.to_lowercase()).map(|id| *id) else {
            return Ok(None);
        };
        self.find_by_id(id).await
    }
}
