//! Shared server state

use agroadb_lookup::{AggregateOrchestrator, AuditedOrchestrator};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// State handed to every handler
pub struct AppState {
    pub lookup: AuditedOrchestrator,
    pub started_at: DateTime<Utc>,
    requests: AtomicU64,
}

impl AppState {
    pub fn new(lookup: AuditedOrchestrator) -> Self {
        Self {
            lookup,
            started_at: Utc::now(),
            requests: AtomicU64::new(0),
        }
    }

    pub fn orchestrator(&self) -> &AggregateOrchestrator {
        self.lookup.inner()
    }

    /// Count one lookup request; returns the new total
    pub fn record_request(&self) -> u64 {
        self.requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            sources: self.orchestrator().registry().len(),
            audit: self.lookup.logger().name().to_string(),
            uptime_seconds: self.uptime_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub sources: usize,
    pub audit: String,
    pub uptime_seconds: u64,
}
