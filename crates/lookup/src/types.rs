//! Request, result and report types

use crate::errors::LookupError;
use crate::normalizer::Payload;
use agroadb_data::Subject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Which sources a request runs against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LookupTarget {
    /// Every registered source accepting the subject kind
    #[default]
    AllSources,
    /// A single source by name
    Source(String),
}

/// One lookup call. Created per request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub subject: Subject,
    pub investigation_id: Option<String>,
    pub target: LookupTarget,
    /// Global deadline; `None` uses the orchestrator default
    pub timeout: Option<Duration>,
}

impl LookupRequest {
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            investigation_id: None,
            target: LookupTarget::AllSources,
            timeout: None,
        }
    }

    /// Validate a raw CPF/CNPJ and build an all-sources request
    pub fn parse(subject: &str) -> Result<Self, LookupError> {
        Ok(Self::new(Subject::parse(subject)?))
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.target = LookupTarget::Source(source.into());
        self
    }

    pub fn with_investigation_id(mut self, id: impl Into<String>) -> Self {
        self.investigation_id = Some(id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Per-source status without its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Success,
    CredentialsMissing,
    Unavailable,
    Error,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Success => "success",
            SourceStatus::CredentialsMissing => "credentials_missing",
            SourceStatus::Unavailable => "unavailable",
            SourceStatus::Error => "error",
        }
    }
}

/// Outcome of querying one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LookupResult {
    Success {
        source: String,
        /// Strategy that produced the payload
        strategy: String,
        payload: Payload,
        elapsed_ms: u64,
    },
    CredentialsMissing {
        source: String,
    },
    Unavailable {
        source: String,
        reason: String,
    },
    Error {
        source: String,
        message: String,
    },
}

impl LookupResult {
    /// Reason recorded for sources cut off by the global deadline
    pub const TIMEOUT_REASON: &'static str = "timeout";

    pub fn success(
        source: impl Into<String>,
        strategy: impl Into<String>,
        payload: Payload,
        elapsed_ms: u64,
    ) -> Self {
        Self::Success {
            source: source.into(),
            strategy: strategy.into(),
            payload,
            elapsed_ms,
        }
    }

    pub fn credentials_missing(source: impl Into<String>) -> Self {
        Self::CredentialsMissing {
            source: source.into(),
        }
    }

    pub fn unavailable(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            source: source.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(source: impl Into<String>) -> Self {
        Self::unavailable(source, Self::TIMEOUT_REASON)
    }

    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            source: source.into(),
            message: message.into(),
        }
    }

    pub fn source(&self) -> &str {
        match self {
            LookupResult::Success { source, .. }
            | LookupResult::CredentialsMissing { source }
            | LookupResult::Unavailable { source, .. }
            | LookupResult::Error { source, .. } => source,
        }
    }

    pub fn status(&self) -> SourceStatus {
        match self {
            LookupResult::Success { .. } => SourceStatus::Success,
            LookupResult::CredentialsMissing { .. } => SourceStatus::CredentialsMissing,
            LookupResult::Unavailable { .. } => SourceStatus::Unavailable,
            LookupResult::Error { .. } => SourceStatus::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, LookupResult::Success { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LookupResult::Unavailable { reason, .. } if reason == Self::TIMEOUT_REASON)
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            LookupResult::Success { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Strategy name for successes
    pub fn strategy(&self) -> Option<&str> {
        match self {
            LookupResult::Success { strategy, .. } => Some(strategy),
            _ => None,
        }
    }

    /// Failure reason or message, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            LookupResult::Unavailable { reason, .. } => Some(reason),
            LookupResult::Error { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub success: usize,
    pub credentials_missing: usize,
    pub unavailable: usize,
    pub error: usize,
}

/// Combined result of one lookup, in registry order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub report_id: Uuid,
    pub subject: Subject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investigation_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub results: Vec<LookupResult>,
}

impl AggregateReport {
    pub fn successes(&self) -> impl Iterator<Item = &LookupResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn get(&self, source: &str) -> Option<&LookupResult> {
        self.results.iter().find(|r| r.source() == source)
    }

    pub fn sources(&self) -> Vec<&str> {
        self.results.iter().map(LookupResult::source).collect()
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            total: self.results.len(),
            ..Default::default()
        };
        for result in &self.results {
            match result.status() {
                SourceStatus::Success => summary.success += 1,
                SourceStatus::CredentialsMissing => summary.credentials_missing += 1,
                SourceStatus::Unavailable => summary.unavailable += 1,
                SourceStatus::Error => summary.error += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_serializes_with_status_tag() {
        let result = LookupResult::timeout("car_sicar");
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(
            value,
            json!({"status": "unavailable", "source": "car_sicar", "reason": "timeout"})
        );
        assert!(result.is_timeout());
        assert_eq!(result.status(), SourceStatus::Unavailable);
    }

    #[test]
    fn test_success_accessors() {
        let mut payload = Payload::new();
        payload.insert("name".into(), json!("ACME AGRO LTDA"));
        let result = LookupResult::success("receita_cnpj", "brasilapi", payload, 42);

        assert!(result.is_success());
        assert_eq!(result.strategy(), Some("brasilapi"));
        assert_eq!(result.payload().unwrap()["name"], json!("ACME AGRO LTDA"));
        assert_eq!(result.detail(), None);
    }

    #[test]
    fn test_request_parse_validates() {
        let request = LookupRequest::parse("11.222.333/0001-81").unwrap();
        assert_eq!(request.target, LookupTarget::AllSources);

        assert!(matches!(
            LookupRequest::parse("123"),
            Err(LookupError::InvalidSubject(_))
        ));
    }

    #[test]
    fn test_report_summary() {
        let report = AggregateReport {
            report_id: Uuid::new_v4(),
            subject: Subject::parse("52998224725").unwrap(),
            investigation_id: None,
            started_at: Utc::now(),
            elapsed_ms: 10,
            results: vec![
                LookupResult::success("a", "api", Payload::new(), 1),
                LookupResult::credentials_missing("b"),
                LookupResult::timeout("c"),
                LookupResult::error("d", "boom"),
            ],
        };

        let summary = report.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.success, 1);
        assert_eq!(summary.credentials_missing, 1);
        assert_eq!(summary.unavailable, 1);
        assert_eq!(summary.error, 1);
        assert_eq!(report.sources(), vec!["a", "b", "c", "d"]);
        assert!(report.get("d").is_some());
        assert_eq!(report.successes().count(), 1);
    }
}
