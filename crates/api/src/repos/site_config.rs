//! Site configuration repository for PostgreSQL.
//!
//! Admin-editable key/value settings (Discord webhook URL, server id).
//! Callers fall back to environment configuration when a key is unset.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Pool, Postgres};

/// Repository for site configuration reads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SiteConfigRepo: Send + Sync {
    /// Value for a configuration key, if set.
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// PostgreSQL implementation of SiteConfigRepo.
#[derive(Clone)]
pub struct PgSiteConfigRepo {
    pool: Pool<Postgres>,
}

impl PgSiteConfigRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SiteConfigRepo for PgSiteConfigRepo {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM site_config WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }
}
