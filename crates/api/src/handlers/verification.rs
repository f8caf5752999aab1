//! Email verification flow.
//!
//! Registration emails a 24-hour verification link. Consuming it flips the
//! account from pending_verification to active. Unverified users can ask
//! for a fresh link; reissuing supersedes any earlier one.

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
use shared::api::{MessageResponse, ResendVerificationPayload, VerifyEmailPayload};

use crate::{
    error::AppError,
    handlers::request_meta,
    middleware::rate_limit::{self, AUTH_POLICY},
    repos::{AuditAction, AuditEntry},
    services::TokenPurpose,
    state::AppState,
};

/// Verification links are good for a day.
const VERIFICATION_TTL_HOURS: i64 = 24;

const INVALID_TOKEN: &str = "Invalid or expired verification token";

pub fn router(state: AppState) -> Router<AppState> {
    let limited = Router::new()
        .route("/resend-verification", post(resend_verification))
        .layer(middleware::from_fn_with_state(
            (state, AUTH_POLICY),
            rate_limit::enforce,
        ));

    Router::new()
        .route("/verify-email", post(verify_email))
        .merge(limited)
}

#[debug_handler]
async fn verify_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<VerifyEmailPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let validated = state
        .tokens
        .validate(&payload.token, TokenPurpose::EmailVerification)
        .await?
        .ok_or(AppError::External(StatusCode::BAD_REQUEST, INVALID_TOKEN))?;

    let user = state
        .repos
        .users
        .find_by_email(&validated.email)
        .await?
        .ok_or(AppError::External(StatusCode::BAD_REQUEST, INVALID_TOKEN))?;

    if user.email_verified_at.is_some() {
        return Err(AppError::External(
            StatusCode::BAD_REQUEST,
            "Email is already verified",
        ));
    }

    // Single-use gate: the consume wins or the request fails
    if !state
        .tokens
        .consume(&payload.token, &validated.identifier)
        .await?
    {
        return Err(AppError::External(StatusCode::BAD_REQUEST, INVALID_TOKEN));
    }

    state.repos.users.mark_verified(user.id).await?;

    let (ip_address, user_agent) = request_meta(&headers);
    state
        .repos
        .audit
        .record(AuditEntry {
            user_id: Some(user.id),
            action: AuditAction::Update,
            resource: "User",
            resource_id: Some(user.id.to_string()),
            metadata: Some(r#"{"type":"email_verified"}"#.to_string()),
            ip_address,
            user_agent,
        })
        .await?;

    // The admin listing shows verification state
    state.stores.cache.invalidate_tag("users");

    tracing::info!(user_id = %user.id, "email verified");

    Ok(Json(MessageResponse {
        message: "Email verified successfully".to_string(),
    }))
}

#[debug_handler]
async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<ResendVerificationPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let email = payload.email.to_lowercase();

    let user = state
        .repos
        .users
        .find_by_email(&email)
        .await?
        .ok_or(AppError::External(StatusCode::BAD_REQUEST, "User not found"))?;

    if user.email_verified_at.is_some() {
        return Err(AppError::External(
            StatusCode::BAD_REQUEST,
            "Email is already verified",
        ));
    }

    let issued = state
        .tokens
        .issue(&email, TokenPurpose::EmailVerification, Duration::hours(VERIFICATION_TTL_HOURS))
        .await?;
    let link = format!(
        "{}/auth/verify-email?token={}",
        state.config.public_url, issued.token
    );

    // Unlike registration, the whole point of this endpoint is the email -
    // a failed send is the caller's problem to retry
    state
        .mailer
        .send_verification_email(&email, &user.display_name, &link)
        .await
        .map_err(|e| anyhow::anyhow!("failed to send verification email: {:?}", e))?;

    tracing::info!(user_id = %user.id, "verification email resent");

    Ok(Json(MessageResponse {
        message: "Verification email sent successfully".to_string(),
    }))
}
