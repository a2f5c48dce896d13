//! Error types for lookups

use agroadb_data::{SubjectError, SubjectKind};
use agroadb_resilience::RetryableError;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single strategy attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    /// No credential configured, or the remote rejected it
    #[error("credentials missing: {0}")]
    CredentialsMissing(String),

    /// Transport failure, timeout or 5xx
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// Response arrived but could not be interpreted
    #[error("parse error: {0}")]
    Parse(String),
}

impl StrategyError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::CredentialsMissing(msg.into())
    }

    pub fn is_credentials_missing(&self) -> bool {
        matches!(self, Self::CredentialsMissing(_))
    }
}

impl RetryableError for StrategyError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }
}

/// A normalizer could not map a raw payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("unexpected payload shape: {0}")]
    UnexpectedShape(String),

    #[error("no normalizer registered for source '{0}'")]
    UnknownSource(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("source '{0}' is already registered")]
    DuplicateSource(String),

    #[error("source '{0}' declares no strategies")]
    NoStrategies(String),

    #[error("source '{0}' accepts no subject kind")]
    NoSubjectKinds(String),
}

/// Request errors detected before any source runs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error("source '{source_name}' does not accept {kind} subjects")]
    UnsupportedSubject {
        source_name: String,
        kind: SubjectKind,
    },

    #[error("invalid subject: {0}")]
    InvalidSubject(#[from] SubjectError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Failure assembling the built-in catalog at startup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid scrape pattern for '{field}': {reason}")]
    Pattern { field: String, reason: String },
}
