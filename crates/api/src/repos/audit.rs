//! Audit log repository for PostgreSQL.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Login,
    PasswordChange,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Login => "LOGIN",
            AuditAction::PasswordChange => "PASSWORD_CHANGE",
        }
    }
}

/// One audit trail entry. `metadata` is a free-form JSON string.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource: &'static str,
    pub resource_id: Option<String>,
    pub metadata: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
}

/// Repository for audit log writes. The log is append-only; reads happen
/// through the admin dashboard's own queries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditLogRepo: Send + Sync {
    /// Append an entry to the audit trail.
    async fn record(&self, entry: AuditEntry) -> Result<()>;
}

/// PostgreSQL implementation of AuditLogRepo.
#[derive(Clone)]
pub struct PgAuditLogRepo {
    pool: Pool<Postgres>,
}

impl PgAuditLogRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogRepo for PgAuditLogRepo {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_logs (user_id, action, resource, resource_id, metadata, ip_address, user_agent) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.user_id)
        .bind(entry.action.as_str())
        .bind(entry.resource)
        .bind(entry.resource_id)
        .bind(entry.metadata)
        .bind(entry.ip_address)
        .bind(entry.user_agent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
