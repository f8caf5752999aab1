//! Fixed-window request counting keyed by client identity.
//!
//! Counters are per-process and in-memory: under horizontal scaling each
//! instance enforces its own budget, which is acceptable because limiting
//! here is advisory. A deployment that needs a global limit should back
//! this with a shared counter store; the limiter is an injected instance,
//! so that swap does not touch call sites.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};

/// Outcome of a limit check. `reset_at` lets callers compute a
/// retry-after without consulting the limiter again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

struct WindowRecord {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Fixed (not sliding) window counter. The N-th request in a window is
/// allowed; the (N+1)-th is rejected.
#[derive(Default)]
pub struct FixedWindowLimiter {
    records: Mutex<HashMap<String, WindowRecord>>,
}

impl FixedWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a request for `key` against a budget of `max_requests` per
    /// `window`. Rejected requests do not consume budget.
    pub fn check(&self, key: &str, max_requests: u32, window: Duration) -> RateLimitDecision {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();

        // Opportunistic purge of finished windows. A full scan per check is
        // fine at this scale; a high-volume deployment would shard or
        // lazily expire instead.
        records.retain(|_, record| now <= record.reset_at);

        match records.get_mut(key) {
            Some(record) if record.count >= max_requests => RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: record.reset_at,
            },
            Some(record) => {
                record.count += 1;
                RateLimitDecision {
                    allowed: true,
                    remaining: max_requests - record.count,
                    reset_at: record.reset_at,
                }
            }
            None => {
                let reset_at = now + window;
                records.insert(
                    key.to_string(),
                    WindowRecord {
                        count: 1,
                        reset_at,
                    },
                );
                RateLimitDecision {
                    allowed: true,
                    remaining: max_requests.saturating_sub(1),
                    reset_at,
                }
            }
        }
    }

    /// Number of identities currently tracked (live windows only).
    pub fn tracked(&self) -> usize {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.len()
    }
}

/// Maps a request to a rate-limit identity: first hop of
/// `x-forwarded-for`, else the peer address, else `"unknown"`.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}
