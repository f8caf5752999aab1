//! User repository for PostgreSQL.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::{User, UserRole, UserStatus};

const USER_COLUMNS: &str =
    "id, email, password_hash, username, display_name, role, status, email_verified_at, created_at";

/// Fields needed to create an account. Role and status take their
/// database defaults (member, pending_verification).
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub username: String,
    pub display_name: String,
}

/// Repository for user operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Health check - verify database connectivity.
    async fn health_check(&self) -> Result<bool>;

    /// Find a user by ID.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Find a user by email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Find a user by username.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Create a new pending account.
    async fn create(&self, new_user: NewUser) -> Result<User>;

    /// Atomically replace the credential, activating the account and
    /// marking the email verified if it was still pending. Proving control
    /// of the mailbox through a reset link doubles as verification.
    async fn reset_credential(&self, id: Uuid, password_hash: &str) -> Result<()>;

    /// Mark the email verified and activate the account.
    async fn mark_verified(&self, id: Uuid) -> Result<()>;

    /// Page through users, newest first.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>>;

    /// Total number of users.
    async fn count(&self) -> Result<i64>;

    /// Change role and/or status; returns the updated row, None if the
    /// user does not exist.
    async fn update_role_status(
        &self,
        id: Uuid,
        role: Option<UserRole>,
        status: Option<UserStatus>,
    ) -> Result<Option<User>>;
}

/// PostgreSQL implementation of UserRepo.
#[derive(Clone)]
pub struct PgUserRepo {
    pool: Pool<Postgres>,
}

impl PgUserRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn health_check(&self) -> Result<bool> {
        let one = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(one == 1)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, username, display_name) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(new_user.email)
        .bind(new_user.password_hash)
        .bind(new_user.username)
        .bind(new_user.display_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn reset_credential(&self, id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query(
            "UPDATE users SET password_hash = $2, \
             status = CASE WHEN status = 'pending_verification' THEN 'active'::user_status ELSE status END, \
             email_verified_at = COALESCE(email_verified_at, now()) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET email_verified_at = now(), status = 'active' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn update_role_status(
        &self,
        id: Uuid,
        role: Option<UserRole>,
        status: Option<UserStatus>,
    ) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = COALESCE($2, role), status = COALESCE($3, status) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(role)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
