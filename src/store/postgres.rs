//! sqlx-backed stores. Tables are described in `schema.sql`.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::types::Json;

use super::{SessionStore, StoreError, UserStore};
use crate::session::SessionRecord;
use crate::types::{SessionId, SubjectId, UserProfile};

/// Sessions in `sessions(sid, sess, expire)`; rows past `expire` are invisible.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete expired rows. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns the database error if the delete fails.
    pub async fn prune_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expire < NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl SessionStore for PgSessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let row: Option<Json<SessionRecord>> =
            sqlx::query_scalar("SELECT sess FROM sessions WHERE sid = $1 AND expire >= NOW()")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|Json(record)| record))
    }

    async fn save(
        &self,
        id: &SessionId,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sessions (sid, sess, expire) \
             VALUES ($1, $2, NOW() + make_interval(secs => $3)) \
             ON CONFLICT (sid) DO UPDATE SET sess = EXCLUDED.sess, expire = EXCLUDED.expire",
        )
        .bind(id.as_str())
        .bind(Json(record))
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE sid = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    profile_image_url: Option<String>,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        Self {
            id: SubjectId(row.id),
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            profile_image_url: row.profile_image_url,
        }
    }
}

/// Profiles in `users`, keyed by provider subject id.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl UserStore for PgUserStore {
    async fn upsert(&self, profile: UserProfile) -> Result<UserProfile, StoreError> {
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (id, email, first_name, last_name, profile_image_url) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET \
                 email = EXCLUDED.email, \
                 first_name = EXCLUDED.first_name, \
                 last_name = EXCLUDED.last_name, \
                 profile_image_url = EXCLUDED.profile_image_url, \
                 updated_at = NOW() \
             RETURNING id, email, first_name, last_name, profile_image_url",
        )
        .bind(profile.id.as_str())
        .bind(&profile.email)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.profile_image_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn find(&self, id: &SubjectId) -> Result<Option<UserProfile>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, first_name, last_name, profile_image_url FROM users WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }
}
