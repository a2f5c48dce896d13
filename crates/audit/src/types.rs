//! Audit record types.
//!
//! - `AuditEvent`: one auditable action, with id, time, level and context
//! - `EventKind`: what happened (a completed lookup report, a failing source, ...)
//! - `AuditContext`: who asked and on behalf of which investigation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Placeholder written over redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Severity level for audit events.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
}

impl std::fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// Outcome of one source inside an audited lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceOutcome {
    /// Source name as registered
    pub source: String,
    /// `success`, `credentials_missing`, `unavailable` or `error`
    pub status: String,
    /// Strategy that answered, for successes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// Failure reason or message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The kind of event being audited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A multi-source lookup finished and produced a report
    LookupReport {
        /// Report identifier
        report_id: Uuid,
        /// Subject in masked form
        subject: String,
        /// `cpf` or `cnpj`
        subject_kind: String,
        /// Per-source outcomes in report order
        sources: Vec<SourceOutcome>,
        /// Number of successful sources
        successes: usize,
        /// Total wall time in milliseconds
        elapsed_ms: u64,
    },
    /// A single source failed in a way worth flagging on its own
    SourceFailure {
        /// Source name
        source: String,
        /// Failure status
        status: String,
        /// Human-readable detail
        detail: String,
    },
}

impl EventKind {
    /// Short name used in text logs and stats
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::LookupReport { .. } => "lookup_report",
            EventKind::SourceFailure { .. } => "source_failure",
        }
    }
}

/// Context information for an audit event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditContext {
    /// Request/trace ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Investigation the lookup belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investigation_id: Option<String>,
    /// User identifier (may be anonymized)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Additional metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AuditContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_investigation_id(mut self, investigation_id: impl Into<String>) -> Self {
        self.investigation_id = Some(investigation_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// One auditable action with full context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: AuditLevel,
    pub kind: EventKind,
    pub context: AuditContext,
    /// Schema version for forward compatibility
    pub schema_version: u32,
}

impl AuditEvent {
    pub const SCHEMA_VERSION: u32 = 1;

    pub fn new(level: AuditLevel, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level,
            kind,
            context: AuditContext::default(),
            schema_version: Self::SCHEMA_VERSION,
        }
    }

    pub fn info(kind: EventKind) -> Self {
        Self::new(AuditLevel::Info, kind)
    }

    pub fn warn(kind: EventKind) -> Self {
        Self::new(AuditLevel::Warn, kind)
    }

    pub fn error(kind: EventKind) -> Self {
        Self::new(AuditLevel::Error, kind)
    }

    pub fn with_context(mut self, context: AuditContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_level(mut self, level: AuditLevel) -> Self {
        self.level = level;
        self
    }

    /// Copy with the listed keys replaced by [`REDACTED`]
    ///
    /// Applies to context metadata keys and to object keys nested anywhere
    /// inside metadata values. Matching is case-insensitive.
    pub fn redacted(&self, fields: &[String]) -> Self {
        let mut event = self.clone();
        for (key, value) in event.context.metadata.iter_mut() {
            if is_sensitive(key, fields) {
                *value = serde_json::Value::String(REDACTED.to_string());
            } else {
                redact_value(value, fields);
            }
        }
        event
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn is_sensitive(key: &str, fields: &[String]) -> bool {
    fields.iter().any(|f| f.eq_ignore_ascii_case(key))
}

fn redact_value(value: &mut serde_json::Value, fields: &[String]) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                if is_sensitive(key, fields) {
                    *inner = serde_json::Value::String(REDACTED.to_string());
                } else {
                    redact_value(inner, fields);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                redact_value(item, fields);
            }
        }
        _ => {}
    }
}
