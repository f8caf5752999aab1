//! Session repository for PostgreSQL.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::{Session, User};

/// Repository for login session operations. Sessions are keyed by the
/// SHA-256 digest of the bearer token, never the plaintext.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// Create a session for a user.
    async fn create(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session>;

    /// The user owning a live (unexpired) session with this token digest.
    async fn find_user_by_token_hash(&self, token_hash: &str) -> Result<Option<User>>;

    /// Delete the session with this token digest (returns whether it existed).
    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<bool>;

    /// Revoke every session for a user; returns the count removed.
    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64>;
}

/// PostgreSQL implementation of SessionRepo.
#[derive(Clone)]
pub struct PgSessionRepo {
    pool: Pool<Postgres>,
}

impl PgSessionRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepo for PgSessionRepo {
    async fn create(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        let session = sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (user_id, token_hash, expires_at) VALUES ($1, $2, $3) \
             RETURNING id, user_id, token_hash, expires_at, created_at",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    async fn find_user_by_token_hash(&self, token_hash: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT u.id, u.email, u.password_hash, u.username, u.display_name, \
                    u.role, u.status, u.email_verified_at, u.created_at \
             FROM sessions s JOIN users u ON u.id = s.user_id \
             WHERE s.token_hash = $1 AND s.expires_at > now()",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
