//! # AgroADB Lookup
//!
//! Queries many public and contracted Brazilian registries about one CPF or
//! CNPJ at the same time and folds the answers into a single report.
//!
//! ## Features
//!
//! - **Source Registry**: named sources, each with an ordered fallback chain of
//!   strategies, frozen before the first lookup
//! - **Fallback Executor**: retries transient failures, skips to the next
//!   strategy on anything else, never retries missing credentials
//! - **Aggregate Orchestrator**: one task per source, a global deadline, and a
//!   report in registry order no matter who answered first
//! - **Normalizers**: pure mappings from each registry's shape to a common payload
//! - **HTTP strategies**: JSON APIs and scraped HTML pages over a pooled client
//! - **Cache / Metrics / Audit**: optional collaborators around the orchestrator
//!
//! ## Example
//!
//! ```rust,ignore
//! use agroadb_lookup::{build_orchestrator, LookupConfig};
//!
//! let config = LookupConfig::from_env()?;
//! let orchestrator = build_orchestrator(&config)?;
//!
//! let report = orchestrator.run_lookup("11.222.333/0001-81", None, 0).await?;
//! for result in &report.results {
//!     println!("{}: {}", result.source(), result.status().as_str());
//! }
//! ```

pub mod audited;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod errors;
pub mod executor;
pub mod http;
pub mod metrics;
pub mod normalizer;
pub mod orchestrator;
pub mod registry;
pub mod types;

pub use audited::{report_events, AuditedOrchestrator};
pub use cache::{CacheStats, LookupCache};
pub use catalog::{build_orchestrator, build_registry, SOURCE_NAMES};
pub use config::{LookupConfig, SourceSettings, ENV_PREFIX};
pub use descriptor::{
    SourceCategory, SourceDescriptor, SourceDescriptorBuilder, SourceInfo, Strategy,
};
pub use errors::{
    CatalogError, ConfigError, LookupError, NormalizationError, RegistryError, StrategyError,
};
pub use executor::{AttemptOutcome, AttemptRecord, ExecutionTrace, FallbackExecutor};
pub use http::{classify_status, Credential, HttpMethod, HttpStrategy, ResponseFormat, ScrapeRule};
pub use metrics::{LookupMetrics, MetricsSnapshot};
pub use normalizer::{Normalizer, Payload, PayloadBuilder};
pub use orchestrator::{AggregateOrchestrator, DEFAULT_TIMEOUT};
pub use registry::{SourceFilter, SourceRegistry};
pub use types::{
    AggregateReport, LookupRequest, LookupResult, LookupTarget, ReportSummary, SourceStatus,
};

pub use agroadb_data::{Subject, SubjectError, SubjectKind};
