//! Lookup metrics
//!
//! Lock-free counters updated by the orchestrator after every report.

use crate::executor::ExecutionTrace;
use crate::types::{AggregateReport, SourceStatus};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct LookupMetrics {
    reports: AtomicU64,
    results_success: AtomicU64,
    results_credentials_missing: AtomicU64,
    results_unavailable: AtomicU64,
    results_error: AtomicU64,
    timeouts: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    fallbacks: AtomicU64,
    cache_hits: AtomicU64,
    /// Report latency in microseconds (exponential moving average)
    latency_ema_us: AtomicU64,
    peak_latency_us: AtomicU64,
}

impl LookupMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished report
    pub fn record_report(&self, report: &AggregateReport, elapsed: Duration) {
        self.reports.fetch_add(1, Ordering::Relaxed);

        for result in &report.results {
            let counter = match result.status() {
                SourceStatus::Success => &self.results_success,
                SourceStatus::CredentialsMissing => &self.results_credentials_missing,
                SourceStatus::Unavailable => &self.results_unavailable,
                SourceStatus::Error => &self.results_error,
            };
            counter.fetch_add(1, Ordering::Relaxed);
            if result.is_timeout() {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
            }
        }

        // EMA with α = 0.3: (3 * current + 7 * previous) / 10
        let current = elapsed.as_micros() as u64;
        let prev = self.latency_ema_us.load(Ordering::Relaxed);
        let ema = if prev == 0 {
            current
        } else {
            (current * 3 + prev * 7) / 10
        };
        self.latency_ema_us.store(ema, Ordering::Relaxed);
        self.peak_latency_us.fetch_max(current, Ordering::Relaxed);
    }

    pub fn record_trace(&self, trace: &ExecutionTrace) {
        let attempts = trace.attempts.len() as u64;
        let mut strategies: Vec<&str> = trace.attempts.iter().map(|a| a.strategy.as_str()).collect();
        strategies.dedup();

        self.attempts.fetch_add(attempts, Ordering::Relaxed);
        self.retries
            .fetch_add(attempts.saturating_sub(strategies.len() as u64), Ordering::Relaxed);
        self.fallbacks
            .fetch_add(u64::from(trace.fallbacks), Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let success = self.results_success.load(Ordering::Relaxed);
        let total = success
            + self.results_credentials_missing.load(Ordering::Relaxed)
            + self.results_unavailable.load(Ordering::Relaxed)
            + self.results_error.load(Ordering::Relaxed);

        MetricsSnapshot {
            reports: self.reports.load(Ordering::Relaxed),
            results_success: success,
            results_credentials_missing: self.results_credentials_missing.load(Ordering::Relaxed),
            results_unavailable: self.results_unavailable.load(Ordering::Relaxed),
            results_error: self.results_error.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            source_success_rate: if total == 0 {
                0.0
            } else {
                success as f64 / total as f64
            },
            avg_report_ms: self.latency_ema_us.load(Ordering::Relaxed) as f64 / 1000.0,
            peak_report_ms: self.peak_latency_us.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.reports,
            &self.results_success,
            &self.results_credentials_missing,
            &self.results_unavailable,
            &self.results_error,
            &self.timeouts,
            &self.attempts,
            &self.retries,
            &self.fallbacks,
            &self.cache_hits,
            &self.latency_ema_us,
            &self.peak_latency_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub reports: u64,
    pub results_success: u64,
    pub results_credentials_missing: u64,
    pub results_unavailable: u64,
    pub results_error: u64,
    pub timeouts: u64,
    pub attempts: u64,
    pub retries: u64,
    pub fallbacks: u64,
    pub cache_hits: u64,
    /// Share of per-source results that succeeded (0.0 - 1.0)
    pub source_success_rate: f64,
    pub avg_report_ms: f64,
    pub peak_report_ms: f64,
}
