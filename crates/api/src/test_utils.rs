//! Shared test utilities for API handler tests.
//!
//! Provides common fixtures and a flexible `TestStateBuilder` for
//! constructing `AppState` instances with only the mocks each test needs.
//! Mocks left unset get permissive defaults (audit accepts writes, site
//! config is empty, email sends succeed); the in-process stores are always
//! real instances, fresh per state.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::test_utils::{TestStateBuilder, mock_user};
//!
//! let mut users = MockUserRepo::new();
//! users.expect_find_by_email().returning(|_| Ok(None));
//!
//! let state = TestStateBuilder::new().with_user_repo(users).build();
//! ```

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::Config;
use crate::middleware::auth::AuthUser;
use crate::models::{User, UserRole, UserStatus, VerificationToken};
use crate::repos::{
    MockAuditLogRepo, MockSessionRepo, MockSiteConfigRepo, MockUserRepo,
    MockVerificationTokenRepo, Repos, VerificationTokenRepo,
};
use crate::services::{MockDiscordNotifier, MockMailer, TokenLifecycle};
use crate::state::AppState;
use crate::stores::Stores;

/// Creates a test configuration with dummy values.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 3000,
        database_url: "postgres://test".to_string(),
        public_url: "https://hearth.test".to_string(),
        smtp_url: None,
        resend_api_key: None,
        discord_webhook_url: None,
        discord_server_id: None,
        env: "test".to_string(),
        sentry_dsn: None,
    }
}

/// Creates an active, verified member with the given email.
pub fn mock_user(email: &str) -> User {
    let username = email.split('@').next().unwrap_or("user").to_string();
    User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash: None,
        username: username.clone(),
        display_name: username,
        role: UserRole::Member,
        status: UserStatus::Active,
        email_verified_at: Some(Utc::now()),
        created_at: Utc::now(),
    }
}

/// An authenticated admin, for exercising role-gated handlers.
pub fn admin_auth() -> AuthUser {
    AuthUser {
        id: Uuid::new_v4(),
        role: UserRole::Admin,
        token_hash: "admin-session-digest".to_string(),
    }
}

/// An authenticated plain member.
pub fn member_auth() -> AuthUser {
    AuthUser {
        id: Uuid::new_v4(),
        role: UserRole::Member,
        token_hash: "member-session-digest".to_string(),
    }
}

/// In-memory stand-in for the Postgres token table, for tests that walk a
/// whole token lifecycle instead of scripting individual repo calls.
#[derive(Default)]
pub struct InMemoryTokenRepo {
    rows: Mutex<Vec<VerificationToken>>,
}

#[async_trait]
impl VerificationTokenRepo for InMemoryTokenRepo {
    async fn create(&self, identifier: &str, token: &str, expires: DateTime<Utc>) -> Result<()> {
        self.rows.lock().unwrap().push(VerificationToken {
            identifier: identifier.to_string(),
            token: token.to_string(),
            expires,
        });
        Ok(())
    }

    async fn find_valid(&self, token: &str) -> Result<Option<VerificationToken>> {
        let now = Utc::now();
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.token == token && row.expires > now)
            .cloned())
    }

    async fn delete(&self, identifier: &str, token: &str) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|row| !(row.identifier == identifier && row.token == token));
        Ok(rows.len() < before)
    }

    async fn delete_for_identifier(&self, identifier: &str) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|row| row.identifier != identifier);
        Ok((before - rows.len()) as u64)
    }
}

/// Builder for constructing test `AppState` with custom mocks.
pub struct TestStateBuilder {
    user_repo: Option<MockUserRepo>,
    token_store: Option<Arc<dyn VerificationTokenRepo>>,
    session_repo: Option<MockSessionRepo>,
    audit_repo: Option<MockAuditLogRepo>,
    site_config_repo: Option<MockSiteConfigRepo>,
    mailer: Option<MockMailer>,
    discord: Option<MockDiscordNotifier>,
}

impl TestStateBuilder {
    pub fn new() -> Self {
        Self {
            user_repo: None,
            token_store: None,
            session_repo: None,
            audit_repo: None,
            site_config_repo: None,
            mailer: None,
            discord: None,
        }
    }

    pub fn with_user_repo(mut self, repo: MockUserRepo) -> Self {
        self.user_repo = Some(repo);
        self
    }

    pub fn with_token_repo(mut self, repo: MockVerificationTokenRepo) -> Self {
        self.token_store = Some(Arc::new(repo));
        self
    }

    /// Use a stateful token store (e.g. [`InMemoryTokenRepo`]) instead of
    /// a scripted mock.
    pub fn with_token_store(mut self, store: Arc<dyn VerificationTokenRepo>) -> Self {
        self.token_store = Some(store);
        self
    }

    pub fn with_session_repo(mut self, repo: MockSessionRepo) -> Self {
        self.session_repo = Some(repo);
        self
    }

    #[allow(dead_code)]
    pub fn with_audit_repo(mut self, repo: MockAuditLogRepo) -> Self {
        self.audit_repo = Some(repo);
        self
    }

    pub fn with_site_config_repo(mut self, repo: MockSiteConfigRepo) -> Self {
        self.site_config_repo = Some(repo);
        self
    }

    pub fn with_mailer(mut self, mailer: MockMailer) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_discord(mut self, discord: MockDiscordNotifier) -> Self {
        self.discord = Some(discord);
        self
    }

    /// Builds the `AppState` using configured mocks or defaults.
    pub fn build(self) -> AppState {
        let token_store = self
            .token_store
            .unwrap_or_else(|| Arc::new(MockVerificationTokenRepo::new()));

        let repos = Repos {
            users: Arc::new(self.user_repo.unwrap_or_else(MockUserRepo::new)),
            sessions: Arc::new(self.session_repo.unwrap_or_else(MockSessionRepo::new)),
            audit: Arc::new(self.audit_repo.unwrap_or_else(default_audit_repo)),
            site_config: Arc::new(
                self.site_config_repo
                    .unwrap_or_else(default_site_config_repo),
            ),
        };

        AppState {
            config: test_config(),
            repos,
            stores: Stores::new(),
            tokens: TokenLifecycle::new(token_store),
            mailer: Arc::new(self.mailer.unwrap_or_else(default_mailer)),
            discord: Arc::new(self.discord.unwrap_or_else(default_discord)),
        }
    }
}

impl Default for TestStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Audit repo that accepts every write.
fn default_audit_repo() -> MockAuditLogRepo {
    let mut repo = MockAuditLogRepo::new();
    repo.expect_record().returning(|_| Ok(()));
    repo
}

/// Site config with no rows set.
fn default_site_config_repo() -> MockSiteConfigRepo {
    let mut repo = MockSiteConfigRepo::new();
    repo.expect_get().returning(|_| Ok(None));
    repo
}

/// Mailer whose sends succeed silently.
fn default_mailer() -> MockMailer {
    let mut mailer = MockMailer::new();
    mailer
        .expect_send_verification_email()
        .returning(|_, _, _| Ok(()));
    mailer
        .expect_send_password_reset_email()
        .returning(|_, _, _| Ok(()));
    mailer
}

/// Notifier that accepts webhooks and has no widget.
fn default_discord() -> MockDiscordNotifier {
    let mut discord = MockDiscordNotifier::new();
    discord.expect_send_webhook().returning(|_, _| true);
    discord.expect_fetch_widget().returning(|_| None);
    discord
}
