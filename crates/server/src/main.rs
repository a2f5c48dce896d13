//! `agroadb-server` binary
//!
//! Reads `AGROADB_*` configuration, builds the source catalog and serves the
//! lookup API. Set `AGROADB_AUDIT_PATH` to persist audit events as JSON
//! Lines; otherwise they are kept in memory.

use agroadb_audit::{create_production_logger, AuditLogger, MemoryLogger};
use agroadb_lookup::{build_orchestrator, AuditedOrchestrator, LookupConfig};
use agroadb_server::LookupServer;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = LookupConfig::from_env().context("invalid AGROADB_* configuration")?;
    let orchestrator = build_orchestrator(&config).context("failed to build source catalog")?;

    let logger: Arc<dyn AuditLogger> = match std::env::var("AGROADB_AUDIT_PATH") {
        Ok(path) if !path.trim().is_empty() => {
            let logger = create_production_logger(path.trim())
                .await
                .with_context(|| format!("failed to open audit log at {}", path))?;
            info!(path = %logger.path().display(), "Audit events written as JSON Lines");
            Arc::new(logger)
        }
        _ => {
            warn!("AGROADB_AUDIT_PATH not set, audit events kept in memory only");
            Arc::new(MemoryLogger::new())
        }
    };

    let bind = std::env::var("AGROADB_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let server = LookupServer::new(AuditedOrchestrator::new(orchestrator, logger.clone()));

    let served = server.run(&bind).await;
    if let Err(e) = logger.flush().await {
        warn!(error = %e, "Failed to flush audit log");
    }
    served.map_err(|e| anyhow::anyhow!("server stopped: {}", e))
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    if std::env::var("AGROADB_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
