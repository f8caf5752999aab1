//! Password reset flow.
//!
//! Flow:
//! 1. POST /auth/forgot-password issues a 1-hour reset token and emails it
//!    as a link; the response is the same whether or not the email is
//!    registered (no enumeration)
//! 2. GET-style POST /auth/validate-reset-token checks the link without
//!    consuming it, so the client can show the form only for live links
//! 3. POST /auth/reset-password consumes the token (single use), replaces
//!    the credential, and revokes every session for the account
//!
//! Consuming a reset token also activates a pending account: proving
//! control of the registered mailbox is taken as equivalent proof of
//! identity to clicking a verification link.

use axum::{
    Json, Router, debug_handler,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::post,
};
use chrono::Duration;
use garde::Validate;
use shared::api::{
    ForgotPasswordPayload, MessageResponse, ResetPasswordPayload, ValidateResetTokenPayload,
};

use crate::{
    error::AppError,
    handlers::auth::hash_password,
    handlers::request_meta,
    middleware::rate_limit::{self, AUTH_POLICY},
    repos::{AuditAction, AuditEntry},
    services::TokenPurpose,
    state::AppState,
};

/// Reset links are good for one hour.
const RESET_TTL_HOURS: i64 = 1;

/// Returned for every reset request, registered or not.
const FORGOT_RESPONSE: &str =
    "If an account with that email exists, we've sent password reset instructions";

const INVALID_TOKEN: &str = "Invalid or expired token";

pub fn router(state: AppState) -> Router<AppState> {
    let limited = Router::new()
        .route("/forgot-password", post(forgot_password))
        .layer(middleware::from_fn_with_state(
            (state, AUTH_POLICY),
            rate_limit::enforce,
        ));

    Router::new()
        .route("/validate-reset-token", post(validate_reset_token))
        .route("/reset-password", post(reset_password))
        .merge(limited)
}

#[debug_handler]
async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ForgotPasswordPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let email = payload.email.to_lowercase();

    // Only credentialed accounts get a reset; OAuth-only accounts have
    // nothing to reset. Either way the caller sees the same message.
    if let Some(user) = state.repos.users.find_by_email(&email).await? {
        if user.password_hash.is_some() {
            let issued = state
                .tokens
                .issue(&email, TokenPurpose::PasswordReset, Duration::hours(RESET_TTL_HOURS))
                .await?;
            let link = format!(
                "{}/auth/reset-password?token={}",
                state.config.public_url, issued.token
            );

            if let Err(e) = state
                .mailer
                .send_password_reset_email(&email, &user.display_name, &link)
                .await
            {
                tracing::warn!(email = %email, "failed to send reset email: {:?}", e);
            }

            let (ip_address, user_agent) = request_meta(&headers);
            state
                .repos
                .audit
                .record(AuditEntry {
                    user_id: Some(user.id),
                    action: AuditAction::PasswordChange,
                    resource: "User",
                    resource_id: Some(user.id.to_string()),
                    metadata: Some(r#"{"type":"reset_requested"}"#.to_string()),
                    ip_address,
                    user_agent,
                })
                .await?;

            tracing::info!(user_id = %user.id, "password reset requested");
        }
    }

    Ok(Json(MessageResponse {
        message: FORGOT_RESPONSE.to_string(),
    }))
}

/// Check a reset link without consuming it. Safe to call repeatedly.
#[debug_handler]
async fn validate_reset_token(
    State(state): State<AppState>,
    Json(payload): Json<ValidateResetTokenPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    if state
        .tokens
        .validate(&payload.token, TokenPurpose::PasswordReset)
        .await?
        .is_none()
    {
        return Err(AppError::External(StatusCode::BAD_REQUEST, INVALID_TOKEN));
    }

    Ok(Json(MessageResponse {
        message: "Token is valid".to_string(),
    }))
}

#[debug_handler]
async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResetPasswordPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let validated = state
        .tokens
        .validate(&payload.token, TokenPurpose::PasswordReset)
        .await?
        .ok_or(AppError::External(StatusCode::BAD_REQUEST, INVALID_TOKEN))?;

    // Missing, expired, consumed, and account-gone all look the same
    let user = state
        .repos
        .users
        .find_by_email(&validated.email)
        .await?
        .ok_or(AppError::External(StatusCode::BAD_REQUEST, INVALID_TOKEN))?;

    let password_hash = hash_password(&payload.password)?;

    // Single-use gate before any mutation; a concurrent consumer wins here
    if !state
        .tokens
        .consume(&payload.token, &validated.identifier)
        .await?
    {
        return Err(AppError::External(StatusCode::BAD_REQUEST, INVALID_TOKEN));
    }

    state
        .repos
        .users
        .reset_credential(user.id, &password_hash)
        .await?;

    // Sessions minted with the old credential die with it
    state.repos.sessions.delete_for_user(user.id).await?;

    let (ip_address, user_agent) = request_meta(&headers);
    state
        .repos
        .audit
        .record(AuditEntry {
            user_id: Some(user.id),
            action: AuditAction::PasswordChange,
            resource: "User",
            resource_id: Some(user.id.to_string()),
            metadata: Some(r#"{"type":"reset_completed"}"#.to_string()),
            ip_address,
            user_agent,
        })
        .await?;

    // Status may have flipped pending -> active
    state.stores.cache.invalidate_tag("users");

    tracing::info!(user_id = %user.id, "password reset completed");

    Ok(Json(MessageResponse {
        message: "Password reset successfully".to_string(),
    }))
}
