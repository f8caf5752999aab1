//! External service abstractions and domain services.
//!
//! Each outbound integration sits behind a trait so handlers can be
//! tested against mocks.
//!
//! ## Services
//!
//! - **tokens** - verification/reset token lifecycle (issue, validate, consume)
//! - **email** - transactional email via Resend (prod) or SMTP (dev)
//! - **discord** - webhook notifications and the community widget
//!
//! ## Usage in Handlers
//!
//! Services are accessed via `AppState`:
//!
//! ```ignore
//! async fn handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
//!     let issued = state.tokens.issue(&email, TokenPurpose::PasswordReset, ttl).await?;
//!     state.mailer.send_password_reset_email(&email, &name, &link).await?;
//! }
//! ```

mod discord;
mod email;
mod tokens;

pub use discord::{
    webhook_settings, DiscordNotifier, Embed, EmbedField, HttpDiscordNotifier, WebhookPayload,
    WebhookSettings,
};
pub use email::{Mailer, MailerImpl};
pub use tokens::{IssuedToken, TokenLifecycle, TokenPurpose, ValidatedToken};

#[cfg(test)]
pub use discord::MockDiscordNotifier;
#[cfg(test)]
pub use email::MockMailer;
