//! HTTP request handlers

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use agroadb_lookup::{
    AggregateReport, CacheStats, LookupError, LookupRequest, MetricsSnapshot, SourceFilter,
    SourceInfo,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::state::{AppState, HealthStatus};

/// Error body: `{ "error": "..." }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<LookupError> for ApiError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::UnknownSource(_) => Self::not_found(err.to_string()),
            LookupError::UnsupportedSubject { .. } | LookupError::InvalidSubject(_) => {
                Self::bad_request(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Lookup request body
#[derive(Debug, Clone, Deserialize)]
pub struct LookupBody {
    /// CPF or CNPJ, formatted or digits only
    pub documento: String,
    /// Restrict to one source
    #[serde(default)]
    pub fonte: Option<String>,
    /// Global deadline; absent or 0 uses the server default
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub investigation_id: Option<String>,
}

impl LookupBody {
    fn into_request(self) -> Result<LookupRequest, LookupError> {
        let mut request = LookupRequest::parse(&self.documento)?;
        if let Some(source) = self.fonte.filter(|s| !s.trim().is_empty()) {
            request = request.with_source(source.trim());
        }
        if let Some(ms) = self.timeout_ms.filter(|ms| *ms > 0) {
            request = request.with_timeout(Duration::from_millis(ms));
        }
        if let Some(id) = self.investigation_id {
            request = request.with_investigation_id(id);
        }
        Ok(request)
    }
}

#[derive(Debug, Deserialize)]
pub struct SourcesQuery {
    pub filter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub requests: u64,
    pub lookup: MetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
    pub uptime_seconds: u64,
}

/// Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(state.health())
}

/// List registered sources, optionally filtered
pub async fn sources_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourcesQuery>,
) -> Result<Json<Vec<SourceInfo>>, ApiError> {
    let filter = match query.filter.as_deref().filter(|f| !f.is_empty()) {
        Some(raw) => Some(
            SourceFilter::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown filter '{}'", raw)))?,
        ),
        None => None,
    };
    Ok(Json(state.orchestrator().registry().infos(filter.as_ref())))
}

/// Run a lookup; partial failures are still 200
pub async fn lookup_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LookupBody>, JsonRejection>,
) -> Result<Json<AggregateReport>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let request_no = state.record_request();

    let request = body.into_request().map_err(|e| {
        warn!(request_no, error = %e, "Rejected lookup request");
        ApiError::from(e)
    })?;

    let report = state.lookup.run(&request).await?;
    info!(
        request_no,
        report_id = %report.report_id,
        sources = report.results.len(),
        elapsed_ms = report.elapsed_ms,
        "Lookup served"
    );
    Ok(Json(report))
}

pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    let orchestrator = state.orchestrator();
    Json(MetricsResponse {
        requests: state.requests(),
        lookup: orchestrator.metrics().snapshot(),
        cache: orchestrator.cache().map(|c| c.stats()),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Drop every cached result
pub async fn clear_cache_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let cleared = state
        .orchestrator()
        .cache()
        .map(|cache| cache.clear())
        .unwrap_or(0);
    info!(cleared, "Lookup cache cleared");
    Json(json!({ "cleared": cleared }))
}
