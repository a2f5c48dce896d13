//! Logger trait, configuration and the in-process loggers.

use crate::error::AuditError;
use crate::types::{AuditEvent, AuditLevel};
use async_trait::async_trait;
use std::collections::HashMap;

/// Configuration for audit logging.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Events below this level are dropped
    pub min_level: AuditLevel,
    /// Whether to redact `redact_fields` before writing
    pub redact_sensitive: bool,
    /// Keys whose values never reach storage
    pub redact_fields: Vec<String>,
    pub enabled: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            min_level: AuditLevel::Info,
            redact_sensitive: true,
            redact_fields: vec![
                "password".to_string(),
                "secret".to_string(),
                "token".to_string(),
                "api_key".to_string(),
                "authorization".to_string(),
                "chave-api-dados".to_string(),
            ],
            enabled: true,
        }
    }
}

impl AuditConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything from Debug up, nothing redacted
    pub fn development() -> Self {
        Self {
            min_level: AuditLevel::Debug,
            redact_sensitive: false,
            ..Default::default()
        }
    }

    pub fn production() -> Self {
        Self::default()
    }

    pub fn with_min_level(mut self, level: AuditLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_redaction(mut self, enabled: bool) -> Self {
        self.redact_sensitive = enabled;
        self
    }

    /// Add fields to redact.
    pub fn with_redact_fields(mut self, fields: Vec<String>) -> Self {
        self.redact_fields.extend(fields);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn should_log(&self, level: AuditLevel) -> bool {
        self.enabled && level >= self.min_level
    }
}

/// Sink for audit events.
///
/// Implementations must be safe to share across lookup tasks.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log(&self, event: AuditEvent) -> Result<(), AuditError>;

    async fn log_batch(&self, events: Vec<AuditEvent>) -> Result<(), AuditError> {
        for event in events {
            self.log(event).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), AuditError>;

    fn name(&self) -> &str;

    async fn health_check(&self) -> Result<(), AuditError> {
        Ok(())
    }

    async fn stats(&self) -> AuditStats {
        AuditStats::default()
    }
}

/// Statistics about audit logging.
#[derive(Debug, Clone, Default)]
pub struct AuditStats {
    pub total_events: u64,
    pub events_by_level: HashMap<AuditLevel, u64>,
    pub failed_events: u64,
    pub bytes_written: u64,
    pub last_event_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Keeps events in memory. Used by tests and the server when no audit
/// path is configured.
#[derive(Default)]
pub struct MemoryLogger {
    events: tokio::sync::RwLock<Vec<AuditEvent>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    /// Events whose kind name matches, e.g. `"lookup_report"`
    pub async fn events_named(&self, name: &str) -> Vec<AuditEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.kind.name() == name)
            .cloned()
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[async_trait]
impl AuditLogger for MemoryLogger {
    async fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }

    async fn stats(&self) -> AuditStats {
        let events = self.events.read().await;
        let mut stats = AuditStats {
            total_events: events.len() as u64,
            ..Default::default()
        };

        for event in events.iter() {
            *stats.events_by_level.entry(event.level).or_insert(0) += 1;
        }
        stats.last_event_time = events.last().map(|e| e.timestamp);

        stats
    }
}
