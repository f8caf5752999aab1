//! Admin dashboard endpoints.
//!
//! All routes require an Owner or Admin session.
//!
//! ## Endpoints
//!
//! - GET /admin/users - paginated listing (cached 60s under tag `users`)
//! - PATCH /admin/users/{id} - change role and/or status
//! - GET /admin/cache - cache diagnostics
//! - POST /admin/cache/invalidate - drop a cache tag
//! - POST /admin/webhooks/discord/test - send a test webhook message

use axum::{
    Json, Router, debug_handler,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::Deserialize;
use shared::api::{
    AdminUserRow, AdminUsersResponse, CacheStatsResponse, InvalidateCachePayload,
    InvalidateCacheResponse, UpdateUserPayload, WebhookTestResponse,
};
use garde::Validate;
use uuid::Uuid;

use crate::{
    error::AppError,
    handlers::request_meta,
    middleware::auth::AuthUser,
    middleware::rate_limit::{self, WEBHOOK_POLICY},
    models::{User, UserRole, UserStatus},
    repos::{AuditAction, AuditEntry},
    services::{WebhookPayload, webhook_settings},
    state::AppState,
};

/// Listing pages stay cached for a minute; mutations invalidate the tag.
const LISTING_TTL_SECS: i64 = 60;

pub fn router(state: AppState) -> Router<AppState> {
    let webhook_routes = Router::new()
        .route("/webhooks/discord/test", post(test_discord_webhook))
        .layer(middleware::from_fn_with_state(
            (state, WEBHOOK_POLICY),
            rate_limit::enforce,
        ));

    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", patch(update_user))
        .route("/cache", get(cache_stats))
        .route("/cache/invalidate", post(invalidate_cache))
        .merge(webhook_routes)
}

#[derive(Debug, Deserialize)]
struct UsersQuery {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_per_page")]
    per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    50
}

fn admin_row(user: User) -> AdminUserRow {
    AdminUserRow {
        id: user.id,
        email: user.email,
        username: user.username,
        display_name: user.display_name,
        role: user.role.as_str().to_string(),
        status: user.status.as_str().to_string(),
        email_verified: user.email_verified_at.is_some(),
        created_at: user.created_at,
    }
}

#[debug_handler]
async fn list_users(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<UsersQuery>,
) -> Result<impl IntoResponse, AppError> {
    user.require_admin()?;

    let page = query.page.max(1);
    let per_page = query.per_page.clamp(1, 100);
    let offset = (page - 1) * per_page;

    let users_repo = state.repos.users.clone();
    let cache_key = format!("admin:users:{}:{}", page, per_page);

    let response = state
        .stores
        .cache
        .get_or_compute(&cache_key, LISTING_TTL_SECS, &["users"], || async move {
            let users = users_repo.list(per_page, offset).await?;
            let total = users_repo.count().await?;

            Ok(AdminUsersResponse {
                users: users.into_iter().map(admin_row).collect(),
                total,
            })
        })
        .await?;

    Ok(Json(response))
}

#[debug_handler]
async fn update_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdateUserPayload>,
) -> Result<impl IntoResponse, AppError> {
    user.require_admin()?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let role = payload.role.as_deref().and_then(UserRole::parse);
    let status = payload.status.as_deref().and_then(UserStatus::parse);

    if role == Some(UserRole::Owner) && user.role != UserRole::Owner {
        return Err(AppError::External(
            StatusCode::FORBIDDEN,
            "Only the owner can grant ownership",
        ));
    }

    let updated = state
        .repos
        .users
        .update_role_status(id, role, status)
        .await?
        .ok_or_else(|| AppError::External(StatusCode::NOT_FOUND, "User not found"))?;

    let (ip_address, user_agent) = request_meta(&headers);
    state
        .repos
        .audit
        .record(AuditEntry {
            user_id: Some(user.id),
            action: AuditAction::Update,
            resource: "User",
            resource_id: Some(id.to_string()),
            metadata: Some(
                serde_json::json!({
                    "role": updated.role,
                    "status": updated.status,
                })
                .to_string(),
            ),
            ip_address,
            user_agent,
        })
        .await?;

    state.stores.cache.invalidate_tag("users");

    tracing::info!(admin_id = %user.id, target_id = %id, "user updated");

    Ok(Json(admin_row(updated)))
}

#[debug_handler]
async fn cache_stats(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    user.require_admin()?;

    let stats = state.stores.cache.stats();

    Ok(Json(CacheStatsResponse {
        total: stats.total,
        active: stats.active,
        expired: stats.expired,
        tags: stats.tags,
    }))
}

#[debug_handler]
async fn invalidate_cache(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<InvalidateCachePayload>,
) -> Result<impl IntoResponse, AppError> {
    user.require_admin()?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let invalidated = state.stores.cache.invalidate_tag(&payload.tag);

    tracing::info!(admin_id = %user.id, tag = %payload.tag, invalidated, "cache tag invalidated");

    Ok(Json(InvalidateCacheResponse { invalidated }))
}

/// Post a test message to the configured webhook and report the outcome
/// without failing the request.
#[debug_handler]
async fn test_discord_webhook(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    user.require_admin()?;

    let settings = webhook_settings(&state).await?;
    let Some(url) = settings.webhook_url else {
        return Err(AppError::External(
            StatusCode::BAD_REQUEST,
            "Discord webhook not configured",
        ));
    };

    let delivered = state
        .discord
        .send_webhook(&url, WebhookPayload::test_message())
        .await;

    tracing::info!(admin_id = %user.id, delivered, "test webhook sent");

    Ok(Json(WebhookTestResponse {
        delivered,
        message: if delivered {
            "Test webhook delivered".to_string()
        } else {
            "Test webhook failed".to_string()
        },
    }))
}
