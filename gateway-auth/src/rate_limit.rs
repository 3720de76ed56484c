use dashmap::DashMap;
use gateway_settings::RateLimits;
use std::time::Instant;

use crate::entities::Role;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-key, per-role token bucket, refilled continuously at
/// `capacity / 60s`. In-memory only — not cross-process consistent.
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    limits: RateLimits,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self { buckets: DashMap::new(), limits }
    }

    fn capacity_for(&self, role: Role) -> Option<u32> {
        match role {
            Role::Admin => self.limits.admin,
            Role::Standard => Some(self.limits.standard),
            Role::Free => Some(self.limits.free),
        }
    }

    /// Attempts to take one token for `key` under `role`'s per-minute
    /// budget. `Ok(())` on success, `Err(retry_after_secs)` when the
    /// bucket is empty. `admin` with no configured cap never limits.
    pub fn check(&self, key: &str, role: Role) -> Result<(), u64> {
        let capacity = match self.capacity_for(role) {
            Some(c) => c as f64,
            None => return Ok(()),
        };
        if capacity <= 0.0 {
            return Err(60);
        }

        let refill_rate = capacity / 60.0;
        let now = Instant::now();
        let mut bucket = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket { tokens: capacity, last_refill: now });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill_rate).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            let wait_secs = (deficit / refill_rate).ceil().max(1.0) as u64;
            Err(wait_secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> RateLimits {
        RateLimits { admin: None, standard: 2, free: 1 }
    }

    #[test]
    fn admin_with_no_cap_is_never_limited() {
        let limiter = RateLimiter::new(limits());
        for _ in 0..100 {
            assert!(limiter.check("admin-key", Role::Admin).is_ok());
        }
    }

    #[test]
    fn standard_allows_burst_up_to_capacity_then_limits() {
        let limiter = RateLimiter::new(limits());
        assert!(limiter.check("k1", Role::Standard).is_ok());
        assert!(limiter.check("k1", Role::Standard).is_ok());
        assert!(limiter.check("k1", Role::Standard).is_err());
    }

    #[test]
    fn distinct_keys_have_independent_buckets() {
        let limiter = RateLimiter::new(limits());
        assert!(limiter.check("free-a", Role::Free).is_ok());
        assert!(limiter.check("free-a", Role::Free).is_err());
        assert!(limiter.check("free-b", Role::Free).is_ok());
    }
}
