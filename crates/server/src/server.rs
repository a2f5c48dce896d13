//! Lookup HTTP server

use agroadb_lookup::AuditedOrchestrator;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers::{
    clear_cache_handler, health_handler, lookup_handler, metrics_handler, sources_handler,
};
use crate::state::AppState;

pub struct LookupServer {
    state: Arc<AppState>,
}

impl LookupServer {
    pub fn new(lookup: AuditedOrchestrator) -> Self {
        Self {
            state: Arc::new(AppState::new(lookup)),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(health_handler))
            // API - Sources
            .route("/api/v1/sources", get(sources_handler))
            .route("/api/v1/lookup", post(lookup_handler))
            // API - Operations
            .route("/api/v1/metrics", get(metrics_handler))
            .route("/api/v1/cache", delete(clear_cache_handler))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state.clone())
    }

    pub async fn run(self, addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let router = self.router();
        let listener = TcpListener::bind(addr).await?;

        info!(
            sources = self.state.orchestrator().registry().len(),
            "AgroADB lookup API listening on http://{}", addr
        );

        axum::serve(listener, router).await?;
        Ok(())
    }
}
