//! PostgreSQL implementation of CommunityRepository
//!
//! Every write locks the community row (`SELECT ... FOR UPDATE`), rebuilds
//! the entity, applies the same mutators the in-memory store uses and then
//! writes back the scalar columns plus whichever child tables changed. The
//! row lock serializes concurrent writers per community.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use circle_core::entities::normalize_invite_code;
use circle_core::{
    AdvancedSettings, BanRecord, ChangeFeed, Clock, Community, CommunityPatch,
    CommunityRepository, Deletion, DomainError, InviteCode, JoinRequest, MessagePermissions,
    MessageSummary, MuteRecord, RepoResult, Snowflake, StoreEvent,
};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgConnection, PgPool, Postgres};
use tracing::instrument;

use crate::mappers::{CommunityDocument, CommunityValues, SummaryValues};
use crate::models::{
    BanModel, CommunityModel, JoinRequestModel, MemberModel, MuteModel, COMMUNITY_COLUMNS,
};

use super::error::{map_db_error, map_unique_violation};

/// PostgreSQL implementation of CommunityRepository
#[derive(Clone)]
pub struct PgCommunityRepository {
    pool: PgPool,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
}

impl PgCommunityRepository {
    pub fn new(pool: PgPool, feed: Arc<dyn ChangeFeed>, clock: Arc<dyn Clock>) -> Self {
        Self { pool, feed, clock }
    }

    /// Run `f` against the locked community inside one transaction. An
    /// error from `f` rolls back; an unchanged community is not rewritten.
    async fn mutate<T: Send>(
        &self,
        id: Snowflake,
        f: impl FnOnce(&mut Community) -> RepoResult<T> + Send,
    ) -> RepoResult<T> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let sql = format!("SELECT {COMMUNITY_COLUMNS} FROM communities WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, CommunityModel>(&sql)
            .bind(id.into_inner())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_error)?
            .filter(|row| !row.is_deleted())
            .ok_or(DomainError::CommunityNotFound(id))?;
        let before = assemble(&mut *tx, vec![row])
            .await?
            .pop()
            .ok_or(DomainError::CommunityNotFound(id))?;

        let mut after = before.clone();
        let out = f(&mut after)?;
        if after != before {
            after.updated_at = self.clock.now();
            write_scalars(&mut *tx, &after).await?;
            sync_children(&mut *tx, Some(&before), &after, self.clock.now()).await?;
        }

        tx.commit().await.map_err(map_db_error)?;
        Ok(out)
    }

    async fn changed(&self, id: Snowflake) {
        self.feed
            .publish(StoreEvent::CommunityChanged {
                community_id: id,
                at: self.clock.now(),
            })
            .await;
    }

    async fn changed_if(&self, id: Snowflake, changed: bool) -> bool {
        if changed {
            self.changed(id).await;
        }
        changed
    }

    async fn fetch(&self, sql: &str, bind: i64) -> RepoResult<Vec<Community>> {
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        let rows = sqlx::query_as::<_, CommunityModel>(sql)
            .bind(bind)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_db_error)?;
        assemble(&mut *conn, rows).await
    }
}

fn group<T>(rows: Vec<T>, key: impl Fn(&T) -> i64) -> HashMap<i64, Vec<T>> {
    let mut grouped: HashMap<i64, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(key(&row)).or_default().push(row);
    }
    grouped
}

/// Load the child rows of `rows` and build the entities, keeping row order
async fn assemble(conn: &mut PgConnection, rows: Vec<CommunityModel>) -> RepoResult<Vec<Community>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

    let members = sqlx::query_as::<_, MemberModel>(
        r#"
        SELECT community_id, user_id, is_admin, joined_at
        FROM community_members
        WHERE community_id = ANY($1)
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_db_error)?;

    let requests = sqlx::query_as::<_, JoinRequestModel>(
        r#"
        SELECT community_id, user_id, requested_at
        FROM community_join_requests
        WHERE community_id = ANY($1)
        ORDER BY requested_at, user_id
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_db_error)?;

    let bans = sqlx::query_as::<_, BanModel>(
        r#"
        SELECT community_id, user_id, moderator_id, banned_at, reason
        FROM community_bans
        WHERE community_id = ANY($1)
        ORDER BY banned_at, user_id
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_db_error)?;

    let mutes = sqlx::query_as::<_, MuteModel>(
        r#"
        SELECT community_id, user_id, moderator_id, started_at, ends_at, reason
        FROM community_mutes
        WHERE community_id = ANY($1)
        ORDER BY started_at, user_id
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_db_error)?;

    let mut members = group(members, |m| m.community_id);
    let mut requests = group(requests, |r| r.community_id);
    let mut bans = group(bans, |b| b.community_id);
    let mut mutes = group(mutes, |m| m.community_id);

    Ok(rows
        .into_iter()
        .map(|row| {
            let id = row.id;
            Community::from(CommunityDocument {
                row,
                members: members.remove(&id).unwrap_or_default(),
                join_requests: requests.remove(&id).unwrap_or_default(),
                bans: bans.remove(&id).unwrap_or_default(),
                mutes: mutes.remove(&id).unwrap_or_default(),
            })
        })
        .collect())
}

/// Binds $1..$29 in the column order shared by the insert and update statements
fn bind_scalars<'q>(
    query: Query<'q, Postgres, PgArguments>,
    values: &'q CommunityValues<'q>,
    last: &'q SummaryValues<'q>,
    updated_at: DateTime<Utc>,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(values.id)
        .bind(values.name)
        .bind(values.description)
        .bind(values.photo_url)
        .bind(values.category)
        .bind(values.is_public)
        .bind(&values.tags)
        .bind(values.members_count)
        .bind(values.only_admins_can_post)
        .bind(values.approval_required)
        .bind(values.lock_flags)
        .bind(values.slow_mode_secs)
        .bind(values.auto_delete_days)
        .bind(values.members_list_visible)
        .bind(values.members_can_add)
        .bind(values.invite_code)
        .bind(values.invite_created_by)
        .bind(values.invite_created_at)
        .bind(values.invite_expires_at)
        .bind(values.invite_usage_limit)
        .bind(values.invite_usage_count)
        .bind(last.message_id)
        .bind(last.sender_id)
        .bind(last.preview)
        .bind(last.kind)
        .bind(last.sent_at)
        .bind(values.deleted_by)
        .bind(values.deleted_at)
        .bind(updated_at)
}

fn invite_taken(community: &Community) -> impl FnOnce() -> DomainError + '_ {
    move || {
        let code = community.invite.as_ref().map_or("", |i| i.code.as_str());
        DomainError::StoreFailure(format!("invite code {code} is already in use"))
    }
}

async fn write_scalars(conn: &mut PgConnection, community: &Community) -> RepoResult<()> {
    let values = CommunityValues::new(community);
    let last = SummaryValues::new(community.last_message.as_ref());
    bind_scalars(
        sqlx::query(
            r#"
            UPDATE communities
            SET name = $2, description = $3, photo_url = $4, category = $5, is_public = $6,
                tags = $7, members_count = $8, only_admins_can_post = $9,
                approval_required = $10, lock_flags = $11, slow_mode_secs = $12,
                auto_delete_days = $13, members_list_visible = $14, members_can_add = $15,
                invite_code = $16, invite_created_by = $17, invite_created_at = $18,
                invite_expires_at = $19, invite_usage_limit = $20, invite_usage_count = $21,
                last_message_id = $22, last_message_sender = $23, last_message_preview = $24,
                last_message_kind = $25, last_message_at = $26, deleted_by = $27,
                deleted_at = $28, updated_at = $29
            WHERE id = $1
            "#,
        ),
        &values,
        &last,
        community.updated_at,
    )
    .execute(&mut *conn)
    .await
    .map_err(|e| map_unique_violation(e, invite_taken(community)))?;
    Ok(())
}

fn ids<'a>(set: impl Iterator<Item = &'a Snowflake>) -> Vec<i64> {
    set.map(|id| id.into_inner()).collect()
}

/// Bring the child tables from `before` (or nothing) to `after`
async fn sync_children(
    conn: &mut PgConnection,
    before: Option<&Community>,
    after: &Community,
    now: DateTime<Utc>,
) -> RepoResult<()> {
    let id = after.id.into_inner();
    let empty = BTreeSet::new();
    let old_members = before.map_or(&empty, |c| &c.members);
    let old_admins = before.map_or(&empty, |c| &c.admins);

    let removed = ids(old_members.difference(&after.members));
    if !removed.is_empty() {
        sqlx::query("DELETE FROM community_members WHERE community_id = $1 AND user_id = ANY($2)")
            .bind(id)
            .bind(&removed)
            .execute(&mut *conn)
            .await
            .map_err(map_db_error)?;
    }

    let added = ids(after.members.difference(old_members));
    if !added.is_empty() {
        sqlx::query(
            r#"
            INSERT INTO community_members (community_id, user_id, is_admin, joined_at)
            SELECT $1, user_id, FALSE, $3 FROM UNNEST($2::BIGINT[]) AS t(user_id)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(id)
        .bind(&added)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(map_db_error)?;
    }

    if old_admins != &after.admins || !added.is_empty() {
        let admins = ids(after.admins.iter());
        sqlx::query(
            r#"
            UPDATE community_members
            SET is_admin = (user_id = ANY($2))
            WHERE community_id = $1 AND is_admin IS DISTINCT FROM (user_id = ANY($2))
            "#,
        )
        .bind(id)
        .bind(&admins)
        .execute(&mut *conn)
        .await
        .map_err(map_db_error)?;
    }

    if before.is_none_or(|c| c.join_requests != after.join_requests) {
        replace_requests(conn, id, &after.join_requests).await?;
    }
    if before.is_none_or(|c| c.bans != after.bans) {
        replace_bans(conn, id, &after.bans).await?;
    }
    if before.is_none_or(|c| c.mutes != after.mutes) {
        replace_mutes(conn, id, &after.mutes).await?;
    }
    Ok(())
}

async fn replace_requests(conn: &mut PgConnection, id: i64, requests: &[JoinRequest]) -> RepoResult<()> {
    sqlx::query("DELETE FROM community_join_requests WHERE community_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(map_db_error)?;
    if requests.is_empty() {
        return Ok(());
    }

    let users: Vec<i64> = requests.iter().map(|r| r.user_id.into_inner()).collect();
    let times: Vec<DateTime<Utc>> = requests.iter().map(|r| r.requested_at).collect();
    sqlx::query(
        r#"
        INSERT INTO community_join_requests (community_id, user_id, requested_at)
        SELECT $1, user_id, requested_at
        FROM UNNEST($2::BIGINT[], $3::TIMESTAMPTZ[]) AS t(user_id, requested_at)
        "#,
    )
    .bind(id)
    .bind(&users)
    .bind(&times)
    .execute(&mut *conn)
    .await
    .map_err(map_db_error)?;
    Ok(())
}

async fn replace_bans(conn: &mut PgConnection, id: i64, bans: &[BanRecord]) -> RepoResult<()> {
    sqlx::query("DELETE FROM community_bans WHERE community_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(map_db_error)?;
    if bans.is_empty() {
        return Ok(());
    }

    let users: Vec<i64> = bans.iter().map(|b| b.user_id.into_inner()).collect();
    let moderators: Vec<i64> = bans.iter().map(|b| b.moderator_id.into_inner()).collect();
    let times: Vec<DateTime<Utc>> = bans.iter().map(|b| b.banned_at).collect();
    let reasons: Vec<Option<String>> = bans.iter().map(|b| b.reason.clone()).collect();
    sqlx::query(
        r#"
        INSERT INTO community_bans (community_id, user_id, moderator_id, banned_at, reason)
        SELECT $1, user_id, moderator_id, banned_at, reason
        FROM UNNEST($2::BIGINT[], $3::BIGINT[], $4::TIMESTAMPTZ[], $5::TEXT[])
            AS t(user_id, moderator_id, banned_at, reason)
        "#,
    )
    .bind(id)
    .bind(&users)
    .bind(&moderators)
    .bind(&times)
    .bind(&reasons)
    .execute(&mut *conn)
    .await
    .map_err(map_db_error)?;
    Ok(())
}

async fn replace_mutes(conn: &mut PgConnection, id: i64, mutes: &[MuteRecord]) -> RepoResult<()> {
    sqlx::query("DELETE FROM community_mutes WHERE community_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(map_db_error)?;
    if mutes.is_empty() {
        return Ok(());
    }

    let users: Vec<i64> = mutes.iter().map(|m| m.user_id.into_inner()).collect();
    let moderators: Vec<i64> = mutes.iter().map(|m| m.moderator_id.into_inner()).collect();
    let starts: Vec<DateTime<Utc>> = mutes.iter().map(|m| m.started_at).collect();
    let ends: Vec<DateTime<Utc>> = mutes.iter().map(|m| m.ends_at).collect();
    let reasons: Vec<Option<String>> = mutes.iter().map(|m| m.reason.clone()).collect();
    sqlx::query(
        r#"
        INSERT INTO community_mutes (community_id, user_id, moderator_id, started_at, ends_at, reason)
        SELECT $1, user_id, moderator_id, started_at, ends_at, reason
        FROM UNNEST($2::BIGINT[], $3::BIGINT[], $4::TIMESTAMPTZ[], $5::TIMESTAMPTZ[], $6::TEXT[])
            AS t(user_id, moderator_id, started_at, ends_at, reason)
        "#,
    )
    .bind(id)
    .bind(&users)
    .bind(&moderators)
    .bind(&starts)
    .bind(&ends)
    .bind(&reasons)
    .execute(&mut *conn)
    .await
    .map_err(map_db_error)?;
    Ok(())
}

#[async_trait]
impl CommunityRepository for PgCommunityRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Snowflake) -> RepoResult<Option<Community>> {
        let sql = format!("SELECT {COMMUNITY_COLUMNS} FROM communities WHERE id = $1");
        Ok(self.fetch(&sql, id.into_inner()).await?.pop())
    }

    #[instrument(skip(self))]
    async fn find_by_invite_code(&self, code: &str) -> RepoResult<Option<Community>> {
        let sql = format!("SELECT {COMMUNITY_COLUMNS} FROM communities WHERE invite_code = $1");
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        let rows = sqlx::query_as::<_, CommunityModel>(&sql)
            .bind(normalize_invite_code(code))
            .fetch_all(&mut *conn)
            .await
            .map_err(map_db_error)?;
        Ok(assemble(&mut *conn, rows).await?.pop())
    }

    #[instrument(skip(self))]
    async fn find_by_member(&self, user_id: Snowflake) -> RepoResult<Vec<Community>> {
        let sql = format!(
            r#"
            SELECT {COMMUNITY_COLUMNS} FROM communities
            WHERE deleted_at IS NULL
              AND id IN (SELECT community_id FROM community_members WHERE user_id = $1)
            ORDER BY id
            "#
        );
        self.fetch(&sql, user_id.into_inner()).await
    }

    #[instrument(skip(self, community), fields(community_id = %community.id))]
    async fn create(&self, community: &Community) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let values = CommunityValues::new(community);
        let last = SummaryValues::new(community.last_message.as_ref());
        bind_scalars(
            sqlx::query(
                r#"
                INSERT INTO communities (
                    id, name, description, photo_url, category, is_public, tags, members_count,
                    only_admins_can_post, approval_required, lock_flags, slow_mode_secs,
                    auto_delete_days, members_list_visible, members_can_add, invite_code,
                    invite_created_by, invite_created_at, invite_expires_at, invite_usage_limit,
                    invite_usage_count, last_message_id, last_message_sender,
                    last_message_preview, last_message_kind, last_message_at, deleted_by,
                    deleted_at, updated_at, creator_id, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                        $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31)
                "#,
            ),
            &values,
            &last,
            community.updated_at,
        )
        .bind(community.creator_id.into_inner())
        .bind(community.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            map_unique_violation(e, || {
                DomainError::StoreFailure(format!("community {} already exists", community.id))
            })
        })?;

        sync_children(&mut *tx, None, community, community.created_at).await?;
        tx.commit().await.map_err(map_db_error)?;

        self.changed(community.id).await;
        Ok(())
    }

    #[instrument(skip(self, patch))]
    async fn update_details(&self, id: Snowflake, patch: &CommunityPatch) -> RepoResult<Community> {
        let updated = self
            .mutate(id, |c| {
                c.apply_patch(patch);
                Ok(c.clone())
            })
            .await?;
        self.changed(id).await;
        Ok(updated)
    }

    #[instrument(skip(self, settings))]
    async fn update_settings(
        &self,
        id: Snowflake,
        permissions: MessagePermissions,
        settings: &AdvancedSettings,
    ) -> RepoResult<Community> {
        let updated = self
            .mutate(id, |c| {
                c.permissions = permissions;
                c.settings = settings.clone();
                Ok(c.clone())
            })
            .await?;
        self.changed(id).await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn soft_delete(&self, id: Snowflake, deletion: Deletion) -> RepoResult<()> {
        self.mutate(id, |c| {
            c.deletion = Some(deletion);
            c.invite = None;
            Ok(())
        })
        .await?;
        self.changed(id).await;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn add_member(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let added = self
            .mutate(id, |c| {
                if c.is_banned(user_id) {
                    return Err(DomainError::UserBanned);
                }
                Ok(c.insert_member(user_id))
            })
            .await?;
        Ok(self.changed_if(id, added).await)
    }

    #[instrument(skip(self, user_ids), fields(count = user_ids.len()))]
    async fn add_members(
        &self,
        id: Snowflake,
        user_ids: &[Snowflake],
    ) -> RepoResult<Vec<Snowflake>> {
        let added = self
            .mutate(id, |c| {
                Ok(user_ids
                    .iter()
                    .copied()
                    .filter(|user_id| c.insert_member(*user_id))
                    .collect::<Vec<_>>())
            })
            .await?;
        self.changed_if(id, !added.is_empty()).await;
        Ok(added)
    }

    #[instrument(skip(self))]
    async fn remove_member(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let removed = self.mutate(id, |c| Ok(c.evict_member(user_id))).await?;
        Ok(self.changed_if(id, removed).await)
    }

    #[instrument(skip(self))]
    async fn add_admin(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let granted = self
            .mutate(id, |c| {
                if !c.is_member(user_id) {
                    return Err(DomainError::NotMember(user_id));
                }
                Ok(c.grant_admin(user_id))
            })
            .await?;
        Ok(self.changed_if(id, granted).await)
    }

    #[instrument(skip(self))]
    async fn remove_admin(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let revoked = self.mutate(id, |c| Ok(c.revoke_admin(user_id))).await?;
        Ok(self.changed_if(id, revoked).await)
    }

    #[instrument(skip(self))]
    async fn add_join_request(&self, id: Snowflake, request: JoinRequest) -> RepoResult<bool> {
        let pushed = self
            .mutate(id, |c| {
                if c.is_banned(request.user_id) {
                    return Err(DomainError::UserBanned);
                }
                Ok(c.push_request(request))
            })
            .await?;
        Ok(self.changed_if(id, pushed).await)
    }

    #[instrument(skip(self))]
    async fn remove_join_request(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let dropped = self.mutate(id, |c| Ok(c.drop_request(user_id))).await?;
        Ok(self.changed_if(id, dropped).await)
    }

    #[instrument(skip(self))]
    async fn approve_join_request(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let approved = self
            .mutate(id, |c| {
                if c.pending_request(user_id).is_none() {
                    return Ok(false);
                }
                if c.is_banned(user_id) {
                    return Err(DomainError::UserBanned);
                }
                Ok(c.insert_member(user_id) || c.drop_request(user_id))
            })
            .await?;
        Ok(self.changed_if(id, approved).await)
    }

    #[instrument(skip(self, ban), fields(user_id = %ban.user_id))]
    async fn add_ban(&self, id: Snowflake, ban: &BanRecord) -> RepoResult<()> {
        self.mutate(id, |c| {
            if c.is_creator(ban.user_id) {
                return Err(DomainError::CannotModerateCreator);
            }
            c.record_ban(ban.clone());
            Ok(())
        })
        .await?;
        self.changed(id).await;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_ban(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let lifted = self.mutate(id, |c| Ok(c.lift_ban(user_id))).await?;
        Ok(self.changed_if(id, lifted).await)
    }

    #[instrument(skip(self, mute), fields(user_id = %mute.user_id))]
    async fn add_mute(&self, id: Snowflake, mute: &MuteRecord) -> RepoResult<()> {
        self.mutate(id, |c| {
            c.record_mute(mute.clone());
            Ok(())
        })
        .await?;
        self.changed(id).await;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_mute(&self, id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        let lifted = self.mutate(id, |c| Ok(c.lift_mute(user_id))).await?;
        Ok(self.changed_if(id, lifted).await)
    }

    #[instrument(skip(self, invite))]
    async fn set_invite(&self, id: Snowflake, invite: Option<&InviteCode>) -> RepoResult<()> {
        self.mutate(id, |c| {
            c.invite = invite.cloned();
            Ok(())
        })
        .await?;
        self.changed(id).await;
        Ok(())
    }

    #[instrument(skip(self, code))]
    async fn redeem_invite(
        &self,
        code: &str,
        user_id: Snowflake,
        now: DateTime<Utc>,
    ) -> RepoResult<Community> {
        let code = normalize_invite_code(code);
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM communities WHERE invite_code = $1 AND deleted_at IS NULL",
        )
        .bind(&code)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?
        .ok_or(DomainError::InvalidInviteCode)?;
        let id = Snowflake::new(id);

        let community = self
            .mutate(id, |c| {
                let invite = c
                    .invite
                    .as_ref()
                    .filter(|invite| invite.code == code)
                    .ok_or(DomainError::InvalidInviteCode)?;
                invite.check_redeemable(now)?;
                if c.is_member(user_id) {
                    return Err(DomainError::AlreadyMember);
                }
                if c.is_banned(user_id) {
                    return Err(DomainError::UserBanned);
                }

                c.insert_member(user_id);
                if let Some(invite) = c.invite.as_mut() {
                    invite.usage_count += 1;
                }
                Ok(c.clone())
            })
            .await
            .map_err(|e| match e {
                DomainError::CommunityNotFound(_) => DomainError::InvalidInviteCode,
                other => other,
            })?;

        self.changed(id).await;
        Ok(community)
    }

    #[instrument(skip(self, summary))]
    async fn set_last_message(&self, id: Snowflake, summary: &MessageSummary) -> RepoResult<()> {
        self.mutate(id, |c| {
            let newer = c
                .last_message
                .as_ref()
                .is_none_or(|current| current.sent_at <= summary.sent_at);
            if newer {
                c.last_message = Some(summary.clone());
            }
            Ok(())
        })
        .await?;
        self.changed(id).await;
        Ok(())
    }
}
