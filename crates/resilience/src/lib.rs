//! Resilience primitives for AgroADB source lookups
//!
//! - **Retry**: bounded retries with a fixed delay, with a per-attempt observer
//! - **Rate Limiting**: governor token buckets with presets for Brazilian
//!   public and contracted APIs
//!
//! # Example
//!
//! ```rust,ignore
//! use agroadb_resilience::{GovernorRateLimiter, RateLimitConfig, RetryExecutor, RetryPolicy};
//!
//! let limiter = GovernorRateLimiter::new("receitaws", RateLimitConfig::receitaws());
//! let retry = RetryExecutor::new(RetryPolicy::default());
//!
//! let body = retry
//!     .execute_observed(
//!         "receita_cnpj",
//!         |_attempt| async {
//!             limiter.acquire().await;
//!             fetch_company().await
//!         },
//!         |attempt| tracing::debug!(attempt = attempt.number, "ReceitaWS attempt"),
//!     )
//!     .await?;
//! ```

pub mod rate_limit;
pub mod retry;

pub use rate_limit::{GovernorRateLimiter, RateLimitConfig, RateLimiterRegistry};
pub use retry::{Attempt, RetryError, RetryExecutor, RetryPolicy, RetryableError};
