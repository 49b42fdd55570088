//! PostgreSQL user directory

use async_trait::async_trait;
use circle_core::{DomainError, RepoResult, Snowflake, UserDirectory, UserProfile};
use sqlx::PgPool;
use tracing::instrument;

use crate::models::UserModel;

use super::error::{map_db_error, map_unique_violation};

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or refresh a profile. Usernames are unique ignoring case.
    #[instrument(skip(self, profile), fields(user_id = %profile.id))]
    pub async fn upsert(&self, profile: &UserProfile) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, display_name, photo_url)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET username = EXCLUDED.username,
                display_name = EXCLUDED.display_name,
                photo_url = EXCLUDED.photo_url
            "#,
        )
        .bind(profile.id.into_inner())
        .bind(&profile.username)
        .bind(profile.display_name.as_deref())
        .bind(profile.photo_url.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_unique_violation(e, || {
                DomainError::ValidationError(format!("username {} is taken", profile.username))
            })
        })?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Snowflake) -> RepoResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserModel>(
            "SELECT id, username, display_name, photo_url FROM users WHERE id = $1",
        )
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(UserProfile::from))
    }

    #[instrument(skip(self))]
    async fn find_by_username(&self, username: &str) -> RepoResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserModel>(
            "SELECT id, username, display_name, photo_url FROM users WHERE LOWER(username) = LOWER($1)",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(UserProfile::from))
    }
}
