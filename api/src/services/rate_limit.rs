//! Per-tenant rate limiting for the foreground sync trigger
//!
//! Token bucket per tenant, held in memory. A foreground sync walks every page of
//! every account and calls the generation provider per new item, so callers get a
//! small burst and a slow refill.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::Instant;

use crate::models::TenantId;

pub struct RateLimitConfig {
    /// Burst capacity
    pub max_tokens: u32,
    /// Tokens added per second
    pub refill_rate: f64,
}

struct TenantBucket {
    tokens: f64,
    last_update: Instant,
}

pub struct TenantRateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<TenantId, TenantBucket>>,
}

impl TenantRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// True if the tenant may proceed; consumes a token when it does
    pub fn check(&self, tenant_id: TenantId) -> bool {
        self.check_at(tenant_id, Instant::now())
    }

    fn check_at(&self, tenant_id: TenantId, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        let bucket = buckets.entry(tenant_id).or_insert_with(|| TenantBucket {
            tokens: self.config.max_tokens as f64,
            last_update: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_update);
        let refill = elapsed.as_secs_f64() * self.config.refill_rate;
        bucket.tokens = (bucket.tokens + refill).min(self.config.max_tokens as f64);
        bucket.last_update = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Foreground sync: burst of 3, then one per 20 seconds
pub static SYNC_RATE_LIMITER: LazyLock<TenantRateLimiter> = LazyLock::new(|| {
    TenantRateLimiter::new(RateLimitConfig {
        max_tokens: 3,
        refill_rate: 0.05,
    })
});
