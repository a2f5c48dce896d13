//! Fallback executor
//!
//! Runs one source: walks its strategies in declared order, retrying
//! transient failures on the same strategy before moving on.
//!
//! | Failure              | Retried | Then          |
//! |----------------------|---------|---------------|
//! | `CredentialsMissing` | no      | next strategy |
//! | `Network`            | yes     | next strategy |
//! | `RateLimited`        | yes     | next strategy |
//! | `Parse`              | no      | next strategy |
//! | normalization        | no      | next strategy |

use crate::descriptor::{SourceDescriptor, Strategy};
use crate::errors::{NormalizationError, StrategyError};
use crate::normalizer::Payload;
use crate::types::LookupResult;
use agroadb_data::Subject;
use agroadb_resilience::{
    Attempt, GovernorRateLimiter, RateLimiterRegistry, RetryExecutor, RetryPolicy, RetryableError,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// How a single attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    CredentialsMissing,
    Network,
    RateLimited,
    Parse,
    Normalization,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::CredentialsMissing => "credentials_missing",
            AttemptOutcome::Network => "network",
            AttemptOutcome::RateLimited => "rate_limited",
            AttemptOutcome::Parse => "parse",
            AttemptOutcome::Normalization => "normalization",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub strategy: String,
    /// 1-based, per strategy
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
}

/// Everything the executor did for one source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionTrace {
    pub source: String,
    pub attempts: Vec<AttemptRecord>,
    /// Transitions from one strategy to the next
    pub fallbacks: u32,
}

impl ExecutionTrace {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Default::default()
        }
    }

    pub fn attempts_for(&self, strategy: &str) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.strategy == strategy)
            .count()
    }

    /// Attempts beyond the first on a strategy
    pub fn retries_for(&self, strategy: &str) -> usize {
        self.attempts_for(strategy).saturating_sub(1)
    }
}

/// Failure of fetch-then-normalize
#[derive(Debug, thiserror::Error)]
enum StepError {
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    #[error("normalization failed: {0}")]
    Normalization(#[from] NormalizationError),
}

impl StepError {
    fn outcome(&self) -> AttemptOutcome {
        match self {
            StepError::Strategy(StrategyError::CredentialsMissing(_)) => {
                AttemptOutcome::CredentialsMissing
            }
            StepError::Strategy(StrategyError::Network(_)) => AttemptOutcome::Network,
            StepError::Strategy(StrategyError::RateLimited { .. }) => AttemptOutcome::RateLimited,
            StepError::Strategy(StrategyError::Parse(_)) => AttemptOutcome::Parse,
            StepError::Normalization(_) => AttemptOutcome::Normalization,
        }
    }
}

impl RetryableError for StepError {
    fn is_retryable(&self) -> bool {
        match self {
            StepError::Strategy(e) => e.is_retryable(),
            StepError::Normalization(_) => false,
        }
    }
}

/// Executes a single source's fallback chain
#[derive(Debug, Clone)]
pub struct FallbackExecutor {
    retry: RetryExecutor,
    limiters: Arc<RateLimiterRegistry>,
}

impl Default for FallbackExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl FallbackExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            retry: RetryExecutor::new(policy),
            limiters: Arc::new(RateLimiterRegistry::new()),
        }
    }

    /// Share rate limiters with other executors
    pub fn with_limiters(mut self, limiters: Arc<RateLimiterRegistry>) -> Self {
        self.limiters = limiters;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        self.retry.policy()
    }

    pub async fn execute(&self, descriptor: &SourceDescriptor, subject: &Subject) -> LookupResult {
        self.execute_traced(descriptor, subject).await.0
    }

    pub async fn execute_traced(
        &self,
        descriptor: &SourceDescriptor,
        subject: &Subject,
    ) -> (LookupResult, ExecutionTrace) {
        let started = Instant::now();
        let source = descriptor.name();
        let limiter = descriptor
            .rate_limit()
            .map(|config| self.limiters.get_or_create(source, config.clone()));

        let mut trace = ExecutionTrace::new(source);
        let mut credential_failures = 0;
        let mut last_error: Option<String> = None;
        let strategies = descriptor.strategies();

        for (position, strategy) in strategies.iter().enumerate() {
            let outcome = self
                .run_strategy(descriptor, strategy, subject, limiter.as_deref(), &mut trace)
                .await;

            let error = match outcome {
                Ok(payload) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    return (
                        LookupResult::success(source, strategy.name(), payload, elapsed_ms),
                        trace,
                    );
                }
                Err(error) => error,
            };

            if matches!(error, StepError::Strategy(StrategyError::CredentialsMissing(_))) {
                credential_failures += 1;
            } else {
                last_error = Some(format!("{}: {}", strategy.name(), error));
            }

            if let Some(next) = strategies.get(position + 1) {
                trace.fallbacks += 1;
                info!(
                    source,
                    from = strategy.name(),
                    to = next.name(),
                    reason = error.outcome().as_str(),
                    "fallback"
                );
            }
        }

        let result = if credential_failures == strategies.len() {
            LookupResult::credentials_missing(source)
        } else {
            LookupResult::error(
                source,
                last_error.unwrap_or_else(|| "all strategies failed".to_string()),
            )
        };
        (result, trace)
    }

    async fn run_strategy(
        &self,
        descriptor: &SourceDescriptor,
        strategy: &Arc<dyn Strategy>,
        subject: &Subject,
        limiter: Option<&GovernorRateLimiter>,
        trace: &mut ExecutionTrace,
    ) -> Result<Payload, StepError> {
        let source = descriptor.name();
        let normalizer = descriptor.normalizer();
        let strategy: &dyn Strategy = strategy.as_ref();
        let context = format!("{}/{}", source, strategy.name());

        self.retry
            .execute_observed(
                &context,
                move |_| async move {
                    if let Some(limiter) = limiter {
                        limiter.acquire().await;
                    }
                    let raw = strategy.fetch(subject).await?;
                    let payload = normalizer(&raw)?;
                    Ok::<Payload, StepError>(payload)
                },
                |attempt: &Attempt<'_, StepError>| {
                    let outcome = attempt
                        .error
                        .map_or(AttemptOutcome::Success, StepError::outcome);
                    let latency_ms = attempt.latency.as_millis() as u64;

                    match attempt.error {
                        None => info!(
                            source,
                            strategy = strategy.name(),
                            attempt = attempt.number,
                            outcome = outcome.as_str(),
                            latency_ms,
                            "Strategy attempt"
                        ),
                        Some(error) => warn!(
                            source,
                            strategy = strategy.name(),
                            attempt = attempt.number,
                            outcome = outcome.as_str(),
                            latency_ms,
                            will_retry = attempt.will_retry,
                            error = %error,
                            "Strategy attempt"
                        ),
                    }

                    trace.attempts.push(AttemptRecord {
                        strategy: strategy.name().to_string(),
                        attempt: attempt.number,
                        outcome,
                        latency_ms,
                    });
                },
            )
            .await
            .map_err(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::{identity, require_str, PayloadBuilder};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays a fixed list of outcomes, repeating the last one
    struct Scripted {
        name: &'static str,
        script: Mutex<VecDeque<Result<Value, StrategyError>>>,
        calls: std::sync::atomic::AtomicU32,
    }

    impl Scripted {
        fn new(name: &'static str, script: Vec<Result<Value, StrategyError>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                script: Mutex::new(script.into()),
                calls: Default::default(),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Strategy for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self, _subject: &Subject) -> Result<Value, StrategyError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let mut script = self.script.lock();
            if script.len() > 1 {
                script.pop_front().unwrap_or_else(|| Err(StrategyError::network("empty")))
            } else {
                script
                    .front()
                    .cloned()
                    .unwrap_or_else(|| Err(StrategyError::network("empty")))
            }
        }
    }

    fn subject() -> Subject {
        Subject::parse("11222333000181").unwrap()
    }

    fn executor() -> FallbackExecutor {
        FallbackExecutor::new(RetryPolicy::new(2, Duration::from_millis(1)))
    }

    fn named(raw: &Value) -> Result<Payload, NormalizationError> {
        Ok(PayloadBuilder::new()
            .insert("name", require_str(raw, "name", &["nome", "razao_social"])?)
            .build())
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let first = Scripted::new("primary", vec![Ok(json!({"nome": "ACME"}))]);
        let second = Scripted::new("secondary", vec![Ok(json!({"nome": "OTHER"}))]);
        let descriptor = SourceDescriptor::builder("receita_cnpj", named)
            .strategy(first.clone())
            .strategy(second.clone())
            .build()
            .unwrap();

        let (result, trace) = executor().execute_traced(&descriptor, &subject()).await;

        assert_eq!(result.strategy(), Some("primary"));
        assert_eq!(result.payload().unwrap()["name"], json!("ACME"));
        assert_eq!(second.calls(), 0);
        assert_eq!(trace.fallbacks, 0);
    }

    #[tokio::test]
    async fn test_network_retried_then_falls_through() {
        let flaky = Scripted::new("flaky", vec![Err(StrategyError::network("reset"))]);
        let backup = Scripted::new("backup", vec![Ok(json!({"razao_social": "ACME"}))]);
        let descriptor = SourceDescriptor::builder("receita_cnpj", named)
            .strategy(flaky.clone())
            .strategy(backup)
            .build()
            .unwrap();

        let (result, trace) = executor().execute_traced(&descriptor, &subject()).await;

        assert_eq!(result.strategy(), Some("backup"));
        assert_eq!(flaky.calls(), 3);
        assert_eq!(trace.retries_for("flaky"), 2);
        assert_eq!(trace.fallbacks, 1);
    }

    #[tokio::test]
    async fn test_recovers_within_retry_budget() {
        let flaky = Scripted::new(
            "flaky",
            vec![
                Err(StrategyError::RateLimited { retry_after: None }),
                Ok(json!({"nome": "ACME"})),
            ],
        );
        let descriptor = SourceDescriptor::builder("receita_cnpj", named)
            .strategy(flaky.clone())
            .build()
            .unwrap();

        let (result, trace) = executor().execute_traced(&descriptor, &subject()).await;

        assert!(result.is_success());
        assert_eq!(flaky.calls(), 2);
        assert_eq!(trace.attempts[0].outcome, AttemptOutcome::RateLimited);
    }

    #[tokio::test]
    async fn test_parse_and_normalization_not_retried() {
        let garbled = Scripted::new("garbled", vec![Err(StrategyError::parse("bad json"))]);
        let shapeless = Scripted::new("shapeless", vec![Ok(json!({"unexpected": true}))]);
        let descriptor = SourceDescriptor::builder("receita_cnpj", named)
            .strategy(garbled.clone())
            .strategy(shapeless.clone())
            .build()
            .unwrap();

        let (result, trace) = executor().execute_traced(&descriptor, &subject()).await;

        assert_eq!(garbled.calls(), 1);
        assert_eq!(shapeless.calls(), 1);
        assert_eq!(trace.attempts[1].outcome, AttemptOutcome::Normalization);
        match result {
            LookupResult::Error { message, .. } => {
                assert!(message.starts_with("shapeless:"), "{}", message);
                assert!(message.contains("name"));
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_credentials_missing() {
        let a = Scripted::new("a", vec![Err(StrategyError::credentials("no token"))]);
        let b = Scripted::new("b", vec![Err(StrategyError::credentials("no token"))]);
        let descriptor = SourceDescriptor::builder("serasa", identity)
            .strategy(a.clone())
            .strategy(b.clone())
            .build()
            .unwrap();

        let (result, trace) = executor().execute_traced(&descriptor, &subject()).await;

        assert_eq!(result, LookupResult::credentials_missing("serasa"));
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
        assert_eq!(trace.fallbacks, 1);
    }

    #[tokio::test]
    async fn test_mixed_failures_report_last_non_credential_error() {
        let network = Scripted::new("network", vec![Err(StrategyError::network("refused"))]);
        let creds = Scripted::new("creds", vec![Err(StrategyError::credentials("no token"))]);
        let descriptor = SourceDescriptor::builder("datajud", identity)
            .strategy(network)
            .strategy(creds)
            .build()
            .unwrap();

        let result = executor().execute(&descriptor, &subject()).await;

        assert_eq!(
            result,
            LookupResult::error("datajud", "network: network error: refused")
        );
    }
}
