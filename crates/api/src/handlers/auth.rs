//! Account registration and session login.
//!
//! Flow:
//! 1. User registers with email + password + username via POST /auth/register
//! 2. The account is created in pending_verification status and a 24-hour
//!    verification token is emailed as a link
//! 3. Until verified, the user can still log in; role-gated surfaces stay
//!    closed to pending accounts through their member role
//! 4. Login verifies the Argon2 credential and mints an opaque session
//!    token (32 random bytes, hex), stored as a SHA-256 digest
//!
//! Security notes:
//! - Unknown email and wrong password produce the same response
//! - Verification email failure does not fail registration; the token
//!   stays valid and can be re-requested via /auth/resend-verification
//! - Discord registration announcements are fail-open: state mutates
//!   first, notification failures are logged and swallowed

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Json, Router, debug_handler,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{Duration, Utc};
use garde::Validate;
use rand::Rng;
use shared::api::{LoginPayload, LoginResponse, MeResponse, RegisterPayload, RegisterResponse};

use crate::{
    error::AppError,
    handlers::request_meta,
    middleware::auth::{AuthUser, digest_token},
    middleware::rate_limit::{self, AUTH_POLICY},
    repos::{AuditAction, AuditEntry, NewUser},
    services::{TokenPurpose, WebhookPayload, webhook_settings},
    state::AppState,
};

/// Sessions live for 30 days.
const SESSION_TTL_DAYS: i64 = 30;

pub fn router(state: AppState) -> Router<AppState> {
    // Credential-guessing surfaces share the tight auth budget
    let limited = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .layer(middleware::from_fn_with_state(
            (state, AUTH_POLICY),
            rate_limit::enforce,
        ));

    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .merge(limited)
}

pub(crate) fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored_hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| anyhow::anyhow!("stored credential unreadable: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn generate_session_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

fn invalid_credentials() -> AppError {
    AppError::External(StatusCode::UNAUTHORIZED, "Invalid email or password")
}

#[debug_handler]
async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let email = payload.email.to_lowercase();
    let username = payload.username.to_lowercase();

    if state.repos.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::External(
            StatusCode::BAD_REQUEST,
            "User already exists with this email",
        ));
    }

    if state
        .repos
        .users
        .find_by_username(&username)
        .await?
        .is_some()
    {
        return Err(AppError::External(
            StatusCode::BAD_REQUEST,
            "Username is already taken",
        ));
    }

    let password_hash = hash_password(&payload.password)?;

    let user = state
        .repos
        .users
        .create(NewUser {
            email: email.clone(),
            password_hash,
            username: username.clone(),
            // Display name keeps the casing the user typed
            display_name: payload.username.clone(),
        })
        .await?;

    // Token before email: a failed send leaves a valid token the user can
    // re-request via resend-verification.
    let issued = state
        .tokens
        .issue(&email, TokenPurpose::EmailVerification, Duration::hours(24))
        .await?;
    let link = format!(
        "{}/auth/verify-email?token={}",
        state.config.public_url, issued.token
    );

    if let Err(e) = state
        .mailer
        .send_verification_email(&email, &user.display_name, &link)
        .await
    {
        tracing::warn!(email = %email, "failed to send verification email: {:?}", e);
    }

    notify_registration(&state, &username, &email).await;

    let (ip_address, user_agent) = request_meta(&headers);
    state
        .repos
        .audit
        .record(AuditEntry {
            user_id: Some(user.id),
            action: AuditAction::Create,
            resource: "User",
            resource_id: Some(user.id.to_string()),
            metadata: Some(
                serde_json::json!({
                    "email": user.email,
                    "role": user.role,
                    "status": user.status,
                })
                .to_string(),
            ),
            ip_address,
            user_agent,
        })
        .await?;

    state.stores.cache.invalidate_tag("users");

    tracing::info!(user_id = %user.id, email = %email, "user registered");

    Ok(Json(RegisterResponse {
        id: user.id,
        email: user.email,
        username: user.username,
        status: user.status.as_str().to_string(),
    }))
}

/// Post the registration announcement if a webhook is configured.
/// Never fails the request.
async fn notify_registration(state: &AppState, username: &str, email: &str) {
    match webhook_settings(state).await {
        Ok(settings) if settings.enabled => {
            if let Some(url) = settings.webhook_url {
                let payload = WebhookPayload::user_registration(username, email);
                if !state.discord.send_webhook(&url, payload).await {
                    tracing::warn!("registration webhook was not delivered");
                }
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("failed to resolve webhook settings: {:?}", e),
    }
}

#[debug_handler]
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginPayload>,
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
        .ok_or_else(invalid_credentials)?;

    // Accounts from an external identity provider have no local credential
    let stored_hash = user.password_hash.as_deref().ok_or_else(invalid_credentials)?;

    if !verify_password(&payload.password, stored_hash)? {
        tracing::warn!(email = %email, "login failed: bad credential");
        return Err(invalid_credentials());
    }

    if user.status == crate::models::UserStatus::Suspended {
        return Err(AppError::External(
            StatusCode::FORBIDDEN,
            "Account suspended",
        ));
    }

    let token = generate_session_token();
    let expires_at = Utc::now() + Duration::days(SESSION_TTL_DAYS);

    state
        .repos
        .sessions
        .create(user.id, &digest_token(&token), expires_at)
        .await?;

    let (ip_address, user_agent) = request_meta(&headers);
    state
        .repos
        .audit
        .record(AuditEntry {
            user_id: Some(user.id),
            action: AuditAction::Login,
            resource: "User",
            resource_id: Some(user.id.to_string()),
            metadata: None,
            ip_address,
            user_agent,
        })
        .await?;

    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(LoginResponse { token, expires_at }))
}

/// Delete the session behind the presented token.
#[debug_handler]
async fn logout(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    state
        .repos
        .sessions
        .delete_by_token_hash(&user.token_hash)
        .await?;

    tracing::info!(user_id = %user.id, "user logged out");

    Ok(StatusCode::OK)
}

#[debug_handler]
async fn me(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .repos
        .users
        .find_by_id(user.id)
        .await?
        .ok_or_else(|| AppError::External(StatusCode::NOT_FOUND, "User not found"))?;

    Ok(Json(MeResponse {
        id: user.id,
        email: user.email,
        username: user.username,
        display_name: user.display_name,
        role: user.role.as_str().to_string(),
        status: user.status.as_str().to_string(),
    }))
}
