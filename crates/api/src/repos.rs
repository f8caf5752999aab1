//! Database repositories (PostgreSQL).
//!
//! Each repository is a trait with a `Pg*` implementation so handlers can
//! be tested against mocks. Postgres holds the durable state: users,
//! sessions, verification tokens, audit trail, site configuration.
//!
//! ## Usage in Handlers
//!
//! Repositories are accessed via `state.repos`:
//!
//! ```ignore
//! async fn handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
//!     let user = state.repos.users.find_by_email(&email).await?;
//! }
//! ```

mod audit;
mod sessions;
mod site_config;
mod tokens;
mod users;

pub use audit::{AuditAction, AuditEntry, AuditLogRepo, PgAuditLogRepo};
pub use sessions::{PgSessionRepo, SessionRepo};
pub use site_config::{PgSiteConfigRepo, SiteConfigRepo};
pub use tokens::{PgVerificationTokenRepo, VerificationTokenRepo};
pub use users::{NewUser, PgUserRepo, UserRepo};

#[cfg(test)]
pub use audit::MockAuditLogRepo;
#[cfg(test)]
pub use sessions::MockSessionRepo;
#[cfg(test)]
pub use site_config::MockSiteConfigRepo;
#[cfg(test)]
pub use tokens::MockVerificationTokenRepo;
#[cfg(test)]
pub use users::MockUserRepo;

use std::sync::Arc;

/// Collection of all database repositories. The verification token repo
/// is not listed here; it is owned by the token lifecycle service.
#[derive(Clone)]
pub struct Repos {
    pub users: Arc<dyn UserRepo>,
    pub sessions: Arc<dyn SessionRepo>,
    pub audit: Arc<dyn AuditLogRepo>,
    pub site_config: Arc<dyn SiteConfigRepo>,
}
