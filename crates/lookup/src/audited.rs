//! Audit hand-off
//!
//! Wraps [`AggregateOrchestrator`] so every finished report is written to an
//! [`AuditLogger`]. The subject is stored masked. Audit failures are logged
//! and swallowed: persistence never changes what the caller gets back.

use crate::errors::LookupError;
use crate::orchestrator::AggregateOrchestrator;
use crate::types::{AggregateReport, LookupRequest, LookupResult, SourceStatus};
use agroadb_audit::{AuditContext, AuditEvent, AuditLogger, EventKind, SourceOutcome};
use std::sync::Arc;
use tracing::warn;

pub struct AuditedOrchestrator {
    inner: AggregateOrchestrator,
    logger: Arc<dyn AuditLogger>,
    context: AuditContext,
}

impl AuditedOrchestrator {
    pub fn new(inner: AggregateOrchestrator, logger: Arc<dyn AuditLogger>) -> Self {
        Self {
            inner,
            logger,
            context: AuditContext::default(),
        }
    }

    /// Base context merged into every event (user id, deployment metadata)
    pub fn with_context(mut self, context: AuditContext) -> Self {
        self.context = context;
        self
    }

    pub fn inner(&self) -> &AggregateOrchestrator {
        &self.inner
    }

    pub fn logger(&self) -> &Arc<dyn AuditLogger> {
        &self.logger
    }

    /// Same contract as [`AggregateOrchestrator::run`]
    ///
    /// Requests rejected before execution produce no report and are not
    /// audited.
    pub async fn run(&self, request: &LookupRequest) -> Result<AggregateReport, LookupError> {
        let report = self.inner.run(request).await?;
        self.record(&report).await;
        Ok(report)
    }

    /// Same contract as [`AggregateOrchestrator::run_lookup`]
    pub async fn run_lookup(
        &self,
        subject: &str,
        target_source: Option<&str>,
        timeout_ms: u64,
    ) -> Result<AggregateReport, LookupError> {
        let report = self
            .inner
            .run_lookup(subject, target_source, timeout_ms)
            .await?;
        self.record(&report).await;
        Ok(report)
    }

    async fn record(&self, report: &AggregateReport) {
        let events = report_events(report, &self.context);
        if let Err(e) = self.logger.log_batch(events).await {
            warn!(
                report_id = %report.report_id,
                logger = self.logger.name(),
                error = %e,
                "Failed to persist lookup audit"
            );
        }
    }
}

impl std::fmt::Debug for AuditedOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditedOrchestrator")
            .field("inner", &self.inner)
            .field("logger", &self.logger.name())
            .finish()
    }
}

/// One `LookupReport` event, followed by a `SourceFailure` per errored source
pub fn report_events(report: &AggregateReport, base: &AuditContext) -> Vec<AuditEvent> {
    let mut context = base
        .clone()
        .with_trace_id(report.report_id.to_string());
    if let Some(investigation_id) = &report.investigation_id {
        context = context.with_investigation_id(investigation_id.clone());
    }

    let summary = report.summary();
    let mut events = vec![AuditEvent::info(EventKind::LookupReport {
        report_id: report.report_id,
        subject: report.subject.masked(),
        subject_kind: report.subject.kind().as_str().to_string(),
        sources: report.results.iter().map(outcome).collect(),
        successes: summary.success,
        elapsed_ms: report.elapsed_ms,
    })
    .with_context(context.clone())];

    events.extend(
        report
            .results
            .iter()
            .filter(|r| r.status() == SourceStatus::Error)
            .map(|r| {
                AuditEvent::warn(EventKind::SourceFailure {
                    source: r.source().to_string(),
                    status: r.status().as_str().to_string(),
                    detail: r.detail().unwrap_or_default().to_string(),
                })
                .with_context(context.clone())
            }),
    );

    events
}

fn outcome(result: &LookupResult) -> SourceOutcome {
    SourceOutcome {
        source: result.source().to_string(),
        status: result.status().as_str().to_string(),
        strategy: result.strategy().map(str::to_string),
        detail: result.detail().map(str::to_string),
    }
}
