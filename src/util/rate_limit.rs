//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{keyed::DefaultKeyedStateStore, InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::hash::Hash;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// One bucket per key
pub type KeyedLimiter<K> = RateLimiter<K, DefaultKeyedStateStore<K>, DefaultClock>;

/// Keys tracked before idle buckets are pruned
const KEYED_PRUNE_THRESHOLD: usize = 10_000;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Create a keyed limiter allowing `per_minute` attempts per key
pub fn create_keyed_limiter<K: Hash + Eq + Clone>(per_minute: u32) -> Arc<KeyedLimiter<K>> {
    let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::keyed(quota))
}

/// Check `key` against a keyed limiter, pruning idle buckets once the map grows
pub fn check_keyed<K: Hash + Eq + Clone>(limiter: &KeyedLimiter<K>, key: &K) -> bool {
    if limiter.len() > KEYED_PRUNE_THRESHOLD {
        limiter.retain_recent();
    }
    limiter.check_key(key).is_ok()
}

/// Input rate limiter for WebSocket messages (per connection)
pub const INPUT_RATE_LIMIT: u32 = 60; // One input per simulation tick

/// Credential attempts (login, 2FA verification) per account per minute
pub const CREDENTIAL_ATTEMPTS_PER_MINUTE: u32 = 10;

/// Per-connection rate limiter state
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    input_limiter: Arc<Limiter>,
}

impl ConnectionRateLimiter {
    pub fn new() -> Self {
        Self {
            input_limiter: create_limiter(INPUT_RATE_LIMIT),
        }
    }

    /// Check if an input message is allowed (returns true if allowed)
    pub fn check_input(&self) -> bool {
        self.input_limiter.check().is_ok()
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_beyond_quota_is_rejected() {
        let limiter = create_limiter(3);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn keyed_buckets_are_independent() {
        let limiter = create_keyed_limiter::<String>(2);
        let (noisy, quiet) = ("noisy".to_string(), "quiet".to_string());
        assert!(check_keyed(&limiter, &noisy));
        assert!(check_keyed(&limiter, &noisy));
        assert!(!check_keyed(&limiter, &noisy));
        assert!(check_keyed(&limiter, &quiet));
    }

    #[test]
    fn zero_quota_falls_back_to_one() {
        let limiter = create_limiter(0);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }
}
