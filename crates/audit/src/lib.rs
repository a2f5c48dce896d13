//! Audit trail for AgroADB lookups.
//!
//! Every completed multi-source lookup can be written as a structured event
//! so investigators can later show which registries were consulted, which
//! answered and through which endpoint.
//!
//! # Backends
//!
//! - [`JsonlAuditLogger`]: JSON Lines file with size or daily rotation
//! - [`MemoryLogger`]: in-memory, for tests and ephemeral servers
//!
//! # Example
//!
//! ```rust,no_run
//! use agroadb_audit::{AuditConfig, AuditEvent, AuditLogger, EventKind, JsonlAuditLogger,
//!     RotationConfig, RotationPolicy};
//!
//! # async fn example() -> Result<(), agroadb_audit::AuditError> {
//! let logger = JsonlAuditLogger::new(
//!     "/var/log/agroadb/audit.jsonl",
//!     AuditConfig::production(),
//!     RotationConfig::new(RotationPolicy::Daily).with_max_files(30),
//! )
//! .await?;
//!
//! logger
//!     .log(AuditEvent::warn(EventKind::SourceFailure {
//!         source: "serasa".into(),
//!         status: "credentials_missing".into(),
//!         detail: "no token".into(),
//!     }))
//!     .await?;
//! logger.flush().await?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod error;
pub mod traits;
pub mod types;

pub use backends::{read_events, JsonlAuditLogger, RotationConfig, RotationPolicy};
pub use error::AuditError;
pub use traits::{AuditConfig, AuditLogger, AuditStats, MemoryLogger};
pub use types::{AuditContext, AuditEvent, AuditLevel, EventKind, SourceOutcome, REDACTED};

/// JSONL logger with daily rotation and 30 days retention.
pub async fn create_production_logger(
    path: impl Into<std::path::PathBuf>,
) -> Result<JsonlAuditLogger, AuditError> {
    let rotation = RotationConfig::new(RotationPolicy::Daily).with_max_files(30);
    JsonlAuditLogger::new(path, AuditConfig::production(), rotation).await
}
