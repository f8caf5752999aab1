//! Shared API request/response types used by the API server and its clients.

use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Create a new account. The account starts unverified; a verification
/// link is emailed to the address.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterPayload {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 8, max = 128))]
    pub password: String,
    /// Public handle shown on the community pages.
    #[garde(pattern(r"^[a-zA-Z0-9_]{3,20}$"))]
    pub username: String,
}

/// Returned after successful registration.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub status: String,
}

/// Sign in with email and password.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginPayload {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 1))]
    pub password: String,
}

/// Returned after a successful login. The token is shown only once;
/// clients send it as a bearer token on subsequent requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Current user profile summary.
#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub status: String,
}

/// Request a password reset link for an email address.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ForgotPasswordPayload {
    #[garde(email)]
    pub email: String,
}

/// Check whether a reset token is still good before showing the form.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ValidateResetTokenPayload {
    #[garde(length(min = 1))]
    pub token: String,
}

/// Consume a reset token together with the new password.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ResetPasswordPayload {
    #[garde(length(min = 1))]
    pub token: String,
    #[garde(length(min = 8, max = 128))]
    pub password: String,
}

/// Consume an email verification token.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct VerifyEmailPayload {
    #[garde(length(min = 1))]
    pub token: String,
}

/// Request a fresh verification link for an unverified account.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ResendVerificationPayload {
    #[garde(email)]
    pub email: String,
}

/// Generic message envelope for endpoints with no structured result.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// One row of the admin user listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUserRow {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub status: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Paginated admin user listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUsersResponse {
    pub users: Vec<AdminUserRow>,
    pub total: i64,
}

/// Change a user's role and/or status (admin only).
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateUserPayload {
    #[garde(inner(pattern(r"^(owner|admin|staff|member)$")))]
    pub role: Option<String>,
    #[garde(inner(pattern(r"^(pending_verification|active|suspended)$")))]
    pub status: Option<String>,
}

/// Snapshot of the caller's standing against the general API rate limit.
#[derive(Debug, Serialize, Deserialize)]
pub struct RateLimitStatusResponse {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Diagnostic snapshot of the in-process cache.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub tags: usize,
}

/// Drop every cache entry carrying the given tag.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct InvalidateCachePayload {
    #[garde(length(min = 1))]
    pub tag: String,
}

/// Returned after a tag invalidation.
#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidateCacheResponse {
    pub invalidated: usize,
}

/// Result of sending a test message to the configured Discord webhook.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookTestResponse {
    pub delivered: bool,
    pub message: String,
}
