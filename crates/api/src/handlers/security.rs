//! Rate limit probe endpoint.
//!
//! Lets clients (and smoke tests) observe their standing against the
//! general API budget. The probe itself consumes one unit of budget.

use axum::{
    Json, Router, debug_handler,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use chrono::Duration;
use shared::api::RateLimitStatusResponse;

use crate::{
    error::AppError,
    middleware::rate_limit::API_POLICY,
    state::AppState,
    stores::client_key,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/rate-limit", get(rate_limit_status))
}

#[debug_handler]
async fn rate_limit_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let key = format!("{}:{}", API_POLICY.scope, client_key(&headers, None));

    let decision = state.stores.rate_limiter.check(
        &key,
        API_POLICY.max_requests,
        Duration::seconds(API_POLICY.window_secs),
    );

    if !decision.allowed {
        return Err(AppError::External(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded. Please try again later.",
        ));
    }

    Ok(Json(RateLimitStatusResponse {
        limit: API_POLICY.max_requests,
        remaining: decision.remaining,
        reset_at: decision.reset_at,
    }))
}
