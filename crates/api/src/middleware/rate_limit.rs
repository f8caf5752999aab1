//! Request rate limiting middleware.
//!
//! Wraps a router in a fixed-window policy keyed by client identity
//! (`x-forwarded-for`, else peer address, else "unknown"). Responses carry
//! `X-RateLimit-*` headers; rejected requests get a 429 JSON body with a
//! `retry_after` hint in seconds.

use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use serde_json::json;

use crate::{
    state::AppState,
    stores::{client_key, RateLimitDecision},
};

#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    /// Key prefix separating the budgets of different surfaces.
    pub scope: &'static str,
    pub max_requests: u32,
    pub window_secs: i64,
}

/// 5 attempts per 15 minutes per client - login, register, reset requests.
pub const AUTH_POLICY: RateLimitPolicy = RateLimitPolicy {
    scope: "auth",
    max_requests: 5,
    window_secs: 15 * 60,
};

/// General API budget.
pub const API_POLICY: RateLimitPolicy = RateLimitPolicy {
    scope: "api",
    max_requests: 100,
    window_secs: 15 * 60,
};

/// Webhook test calls.
pub const WEBHOOK_POLICY: RateLimitPolicy = RateLimitPolicy {
    scope: "webhook",
    max_requests: 10,
    window_secs: 60,
};

/// Middleware entry point; attach with
/// `middleware::from_fn_with_state((state, POLICY), rate_limit::enforce)`.
pub async fn enforce(
    State((state, policy)): State<(AppState, RateLimitPolicy)>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let key = format!("{}:{}", policy.scope, client_key(request.headers(), peer));

    let decision = state.stores.rate_limiter.check(
        &key,
        policy.max_requests,
        Duration::seconds(policy.window_secs),
    );

    if !decision.allowed {
        let retry_after = (decision.reset_at - Utc::now()).num_seconds().max(0);
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "Too many requests",
                "message": "Rate limit exceeded. Please try again later.",
                "retry_after": retry_after,
            })),
        )
            .into_response();
        apply_headers(&mut response, policy.max_requests, &decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(&mut response, policy.max_requests, &decision);
    response
}

fn apply_headers(response: &mut Response, limit: u32, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    if let Ok(reset) = HeaderValue::from_str(&decision.reset_at.to_rfc3339()) {
        headers.insert("x-ratelimit-reset", reset);
    }
}
