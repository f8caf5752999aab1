//! Ephemeral in-process stores.
//!
//! Both stores live for the process's lifetime, are constructed once at
//! startup, and are handed to handlers through `AppState` rather than
//! living as module globals - tests build their own instances.
//!
//! - **cache** - read-through TTL cache with tag invalidation
//! - **rate_limit** - fixed-window counters keyed by client identity
//!
//! Neither store is durable. The one durable store in the system (users,
//! sessions, verification tokens) is Postgres, behind `crate::repos`.

mod cache;
mod rate_limit;

pub use cache::{CacheStats, MemoryCache};
pub use rate_limit::{client_key, FixedWindowLimiter, RateLimitDecision};

use std::sync::Arc;

/// Collection of the in-process stores.
#[derive(Clone)]
pub struct Stores {
    pub cache: Arc<MemoryCache>,
    pub rate_limiter: Arc<FixedWindowLimiter>,
}

impl Stores {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(MemoryCache::new()),
            rate_limiter: Arc::new(FixedWindowLimiter::new()),
        }
    }
}

impl Default for Stores {
    fn default() -> Self {
        Self::new()
    }
}
