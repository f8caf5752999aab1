use std::sync::Arc;

use crate::{
    config::Config,
    repos::Repos,
    services::{DiscordNotifier, Mailer, TokenLifecycle},
    stores::Stores,
};

#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Database repositories.
    pub repos: Repos,
    /// In-process stores (cache, rate limiter).
    pub stores: Stores,
    /// Verification/reset token lifecycle.
    pub tokens: TokenLifecycle,
    /// Outbound email.
    pub mailer: Arc<dyn Mailer>,
    /// Discord integration.
    pub discord: Arc<dyn DiscordNotifier>,
}
