//! Verification token repository for PostgreSQL.
//!
//! One table backs both email verification and password reset; the two
//! purposes are distinguished by identifier convention (reset identifiers
//! carry a `reset_` prefix). Rows are unique per `(identifier, token)`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::models::VerificationToken;

/// Repository for verification token operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VerificationTokenRepo: Send + Sync {
    /// Persist a token record.
    async fn create(&self, identifier: &str, token: &str, expires: DateTime<Utc>) -> Result<()>;

    /// First non-expired record carrying this token value.
    async fn find_valid(&self, token: &str) -> Result<Option<VerificationToken>>;

    /// Delete the exact `(identifier, token)` pair (returns whether it existed).
    async fn delete(&self, identifier: &str, token: &str) -> Result<bool>;

    /// Delete every token for an identifier; returns the count removed.
    async fn delete_for_identifier(&self, identifier: &str) -> Result<u64>;
}

/// PostgreSQL implementation of VerificationTokenRepo.
#[derive(Clone)]
pub struct PgVerificationTokenRepo {
    pool: Pool<Postgres>,
}

impl PgVerificationTokenRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VerificationTokenRepo for PgVerificationTokenRepo {
    async fn create(&self, identifier: &str, token: &str, expires: DateTime<Utc>) -> Result<()> {
        sqlx::query("INSERT INTO verification_tokens (identifier, token, expires) VALUES ($1, $2, $3)")
            .bind(identifier)
            .bind(token)
            .bind(expires)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_valid(&self, token: &str) -> Result<Option<VerificationToken>> {
        let record = sqlx::query_as::<_, VerificationToken>(
            "SELECT identifier, token, expires FROM verification_tokens \
             WHERE token = $1 AND expires > now() LIMIT 1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn delete(&self, identifier: &str, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM verification_tokens WHERE identifier = $1 AND token = $2")
            .bind(identifier)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_identifier(&self, identifier: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM verification_tokens WHERE identifier = $1")
            .bind(identifier)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
