//! Aggregate orchestrator
//!
//! Fans a lookup out to every selected source at once and assembles the
//! report. Each source runs as its own task in a [`JoinSet`]; results land in
//! a slot indexed by registry position, so the report order never depends on
//! which registry answered first.
//!
//! When the global deadline passes, the remaining tasks are aborted and their
//! slots are filled with `Unavailable { reason: "timeout" }`. A source failure
//! never turns into an `Err`: only malformed requests do, and those are
//! rejected before anything runs.

use crate::cache::LookupCache;
use crate::errors::LookupError;
use crate::executor::{ExecutionTrace, FallbackExecutor};
use crate::metrics::LookupMetrics;
use crate::registry::SourceRegistry;
use crate::types::{AggregateReport, LookupRequest, LookupResult, LookupTarget};
use agroadb_data::Subject;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default global deadline when neither the request nor the caller sets one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AggregateOrchestrator {
    registry: Arc<SourceRegistry>,
    executor: Arc<FallbackExecutor>,
    default_timeout: Duration,
    cache: Option<Arc<LookupCache>>,
    metrics: Arc<LookupMetrics>,
}

impl AggregateOrchestrator {
    /// Takes the frozen registry; it is never written again
    pub fn new(registry: Arc<SourceRegistry>, executor: FallbackExecutor) -> Self {
        Self {
            registry,
            executor: Arc::new(executor),
            default_timeout: DEFAULT_TIMEOUT,
            cache: None,
            metrics: Arc::new(LookupMetrics::new()),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_cache(mut self, cache: Arc<LookupCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<LookupMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<LookupMetrics> {
        &self.metrics
    }

    pub fn cache(&self) -> Option<&Arc<LookupCache>> {
        self.cache.as_ref()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Validate the subject and run. `timeout_ms == 0` uses the default.
    pub async fn run_lookup(
        &self,
        subject: &str,
        target_source: Option<&str>,
        timeout_ms: u64,
    ) -> Result<AggregateReport, LookupError> {
        let mut request = LookupRequest::parse(subject)?;
        if let Some(source) = target_source {
            request = request.with_source(source);
        }
        if timeout_ms > 0 {
            request = request.with_timeout(Duration::from_millis(timeout_ms));
        }
        self.run(&request).await
    }

    /// Registry indices to execute, in registry order
    fn select(&self, request: &LookupRequest) -> Result<Vec<usize>, LookupError> {
        let kind = request.subject.kind();
        match &request.target {
            LookupTarget::Source(name) => {
                let index = self
                    .registry
                    .index_of(name)
                    .ok_or_else(|| LookupError::UnknownSource(name.clone()))?;
                let accepts = self
                    .registry
                    .get_index(index)
                    .is_some_and(|d| d.accepts(kind));
                if !accepts {
                    return Err(LookupError::UnsupportedSubject {
                        source_name: name.clone(),
                        kind,
                    });
                }
                Ok(vec![index])
            }
            LookupTarget::AllSources => Ok(self
                .registry
                .iter()
                .enumerate()
                .filter(|(_, d)| d.accepts(kind))
                .map(|(i, _)| i)
                .collect()),
        }
    }

    pub async fn run(&self, request: &LookupRequest) -> Result<AggregateReport, LookupError> {
        let selected = self.select(request)?;

        let started_at = Utc::now();
        let started = Instant::now();
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let deadline = started + timeout;
        let report_id = Uuid::new_v4();
        let subject = &request.subject;

        debug!(
            %report_id,
            subject = %subject,
            sources = selected.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Starting lookup"
        );

        let mut slots: Vec<Option<LookupResult>> = vec![None; selected.len()];
        let mut tasks = JoinSet::new();

        for (slot, &index) in selected.iter().enumerate() {
            if let Some(hit) = self.cached(index, subject) {
                self.metrics.record_cache_hit();
                slots[slot] = Some(hit);
                continue;
            }

            let registry = Arc::clone(&self.registry);
            let executor = Arc::clone(&self.executor);
            let subject = subject.clone();
            tasks.spawn(async move {
                let outcome = match registry.get_index(index) {
                    Some(descriptor) => {
                        AssertUnwindSafe(executor.execute_traced(descriptor, &subject))
                            .catch_unwind()
                            .await
                            .map_err(|panic| (descriptor.name().to_string(), panic))
                    }
                    None => Err((
                        format!("#{}", index),
                        Box::new("missing source") as Box<dyn Any + Send>,
                    )),
                };
                (slot, outcome)
            });
        }

        let mut timed_out = false;
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((slot, outcome)))) => {
                    let result = self.settle(outcome);
                    // only fresh executions are stored; a hit keeps its original expiry
                    if let Some(cache) = &self.cache {
                        cache.insert(subject.digits(), &result);
                    }
                    slots[slot] = Some(result);
                }
                Ok(Some(Err(join_error))) => {
                    warn!(%report_id, error = %join_error, "Source task did not complete");
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    warn!(
                        %report_id,
                        pending = tasks.len(),
                        timeout_ms = timeout.as_millis() as u64,
                        "Global deadline reached, cancelling pending sources"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        let results: Vec<LookupResult> = selected
            .iter()
            .zip(slots)
            .map(|(&index, slot)| {
                slot.unwrap_or_else(|| {
                    let name = self
                        .registry
                        .get_index(index)
                        .map(|d| d.name().to_string())
                        .unwrap_or_default();
                    if timed_out {
                        LookupResult::timeout(name)
                    } else {
                        LookupResult::error(name, "execution aborted")
                    }
                })
            })
            .collect();

        let elapsed = started.elapsed();
        let report = AggregateReport {
            report_id,
            subject: subject.clone(),
            investigation_id: request.investigation_id.clone(),
            started_at,
            elapsed_ms: elapsed.as_millis() as u64,
            results,
        };
        self.metrics.record_report(&report, elapsed);

        let summary = report.summary();
        info!(
            %report_id,
            subject = %subject,
            sources = summary.total,
            success = summary.success,
            credentials_missing = summary.credentials_missing,
            unavailable = summary.unavailable,
            error = summary.error,
            elapsed_ms = report.elapsed_ms,
            "Lookup report assembled"
        );

        Ok(report)
    }

    fn cached(&self, index: usize, subject: &Subject) -> Option<LookupResult> {
        let cache = self.cache.as_ref()?;
        let descriptor = self.registry.get_index(index)?;
        cache.get(descriptor.name(), subject.digits())
    }

    /// Turn a finished task's outcome into its result
    fn settle(&self, outcome: TaskOutcome) -> LookupResult {
        match outcome {
            Ok((result, trace)) => {
                self.metrics.record_trace(&trace);
                result
            }
            Err((source, panic)) => {
                let message = panic_message(panic.as_ref());
                warn!(source = %source, panic = %message, "Source execution panicked");
                LookupResult::error(source, format!("execution panicked: {}", message))
            }
        }
    }
}

type TaskOutcome = Result<(LookupResult, ExecutionTrace), (String, Box<dyn Any + Send>)>;

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for AggregateOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateOrchestrator")
            .field("sources", &self.registry.names())
            .field("default_timeout", &self.default_timeout)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}
