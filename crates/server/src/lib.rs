//! # AgroADB Server
//!
//! HTTP front end for multi-source lookups.
//!
//! ## Endpoints
//!
//! - `GET /health`
//! - `GET /api/v1/sources?filter=no_credentials|credentials|cpf|cnpj|<category>`
//! - `POST /api/v1/lookup` with `{ "documento", "fonte"?, "timeout_ms"?, "investigation_id"? }`
//! - `GET /api/v1/metrics`
//! - `DELETE /api/v1/cache`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agroadb_lookup::{build_orchestrator, AuditedOrchestrator, LookupConfig};
//! use agroadb_audit::MemoryLogger;
//! use agroadb_server::LookupServer;
//! use std::sync::Arc;
//!
//! let orchestrator = build_orchestrator(&LookupConfig::from_env()?)?;
//! let lookup = AuditedOrchestrator::new(orchestrator, Arc::new(MemoryLogger::new()));
//! LookupServer::new(lookup).run("127.0.0.1:8080").await?;
//! ```

mod handlers;
mod server;
mod state;

pub use handlers::{ApiError, LookupBody, MetricsResponse};
pub use server::LookupServer;
pub use state::{AppState, HealthStatus};
