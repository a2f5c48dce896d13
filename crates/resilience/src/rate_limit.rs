//! Rate Limiting with Governor
//!
//! Token bucket limits for external registries. Public government APIs and
//! free CNPJ mirrors throttle aggressively, so every source can carry its own
//! bucket.

use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Configuration for rate limiting
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests per period
    pub requests_per_period: u32,
    /// Period duration
    pub period: Duration,
    /// Maximum burst size
    pub burst_size: u32,
}

impl RateLimitConfig {
    pub fn new(requests_per_period: u32, period: Duration) -> Self {
        Self {
            requests_per_period,
            period,
            burst_size: requests_per_period,
        }
    }

    /// Set burst size
    pub fn with_burst(mut self, burst_size: u32) -> Self {
        self.burst_size = burst_size;
        self
    }

    /// ReceitaWS free tier: 3 requests per minute
    pub fn receitaws() -> Self {
        Self::new(3, Duration::from_secs(60))
    }

    /// BrasilAPI and similar community mirrors
    pub fn public_mirror() -> Self {
        Self::new(60, Duration::from_secs(60)).with_burst(10)
    }

    /// Government open-data APIs (SICAR, SIGEF, IBAMA, CGU)
    pub fn government_api() -> Self {
        Self::new(90, Duration::from_secs(60)).with_burst(5)
    }

    /// Contracted APIs (SERPRO, credit bureaus)
    pub fn contracted_api() -> Self {
        Self::new(10, Duration::from_secs(1))
    }

    /// Unlimited (for testing or local services)
    pub fn unlimited() -> Self {
        Self::new(100_000, Duration::from_secs(1))
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Rate limiter using Governor's token bucket algorithm
pub struct GovernorRateLimiter {
    limiter: Arc<DirectLimiter>,
    config: RateLimitConfig,
    name: String,
}

impl std::fmt::Debug for GovernorRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernorRateLimiter")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

impl GovernorRateLimiter {
    pub fn new(name: impl Into<String>, config: RateLimitConfig) -> Self {
        let quota = Self::config_to_quota(&config);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            config,
            name: name.into(),
        }
    }

    fn config_to_quota(config: &RateLimitConfig) -> Quota {
        let requests = u64::from(config.requests_per_period.max(1));
        let interval_nanos = (config.period.as_nanos() as u64 / requests).max(1);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);

        Quota::with_period(Duration::from_nanos(interval_nanos))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Non-blocking check; consumes a permit when it returns true
    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Wait until a permit is available
    pub async fn acquire(&self) {
        loop {
            match self.limiter.check() {
                Ok(_) => {
                    debug!(limiter = %self.name, "Rate limit permit acquired");
                    return;
                }
                Err(not_until) => {
                    let wait_time = not_until.wait_time_from(DefaultClock::default().now());
                    debug!(
                        limiter = %self.name,
                        wait_ms = wait_time.as_millis() as u64,
                        "Rate limited, waiting"
                    );
                    tokio::time::sleep(wait_time).await;
                }
            }
        }
    }
}

/// One limiter per named source
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    limiters: dashmap::DashMap<String, Arc<GovernorRateLimiter>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing limiter for `name`, or a new one built from `config`
    pub fn get_or_create(&self, name: &str, config: RateLimitConfig) -> Arc<GovernorRateLimiter> {
        self.limiters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(GovernorRateLimiter::new(name, config)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allows_within_limit() {
        let limiter =
            GovernorRateLimiter::new("test", RateLimitConfig::new(10, Duration::from_secs(1)));

        for _ in 0..10 {
            assert!(limiter.check());
        }
    }

    #[tokio::test]
    async fn test_blocks_over_burst() {
        let limiter = GovernorRateLimiter::new("receitaws", RateLimitConfig::receitaws());

        assert!(limiter.check());
        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check());
    }

    #[tokio::test]
    async fn test_acquire_waits() {
        let limiter = GovernorRateLimiter::new(
            "test",
            RateLimitConfig::new(10, Duration::from_millis(100)).with_burst(1),
        );

        limiter.acquire().await;

        let start = std::time::Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_registry_get_or_create_reuses() {
        let registry = RateLimiterRegistry::new();

        let a = registry.get_or_create("sicar", RateLimitConfig::government_api());
        let b = registry.get_or_create("sicar", RateLimitConfig::unlimited());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.config(), &RateLimitConfig::government_api());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_zero_config_does_not_panic() {
        let limiter = GovernorRateLimiter::new("odd", RateLimitConfig::new(0, Duration::ZERO));
        assert!(limiter.check());
    }
}
