// ---------------------------------------------------------------------------
// handlers.rs: root metadata, health probe, HTTP-level error type
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use serde_json::{Value, json};

use crate::mcp::types::SERVER_VERSION;
use crate::state::AppState;
use crate::upstream::ServiceClient;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Failures of the HTTP surface itself. Upstream and JSON-RPC failures are
/// reported as data, never through this type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("API error: {}", self);
        let body = json!({ "detail": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// GET /
// ---------------------------------------------------------------------------

pub async fn root() -> Json<Value> {
    Json(json!({
        "name": "MCP Jira Confluence SSE Server",
        "version": SERVER_VERSION,
        "transport": "sse",
        "endpoints": {
            "health": "/health",
            "sse": "/sse",
            "messages": "/sse/messages",
            "mcp": "/mcp",
            "metrics": "/metrics"
        }
    }))
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub issue_tracker: String,
    pub wiki: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub services: ServiceStatus,
    pub connected_clients: usize,
}

/// Probe each upstream independently; a failing service is reported, not raised.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let jira = tokio::spawn(probe(state.issue_tracker.clone()));
    let confluence = tokio::spawn(probe(state.wiki.clone()));

    let (jira, confluence) = tokio::join!(jira, confluence);
    let services = ServiceStatus {
        issue_tracker: jira.map_err(|e| ApiError::Internal(format!("health probe task failed: {e}")))?,
        wiki: confluence.map_err(|e| ApiError::Internal(format!("health probe task failed: {e}")))?,
    };

    let now = chrono::Utc::now();
    Ok(Json(HealthResponse {
        status: "ok",
        timestamp: now.timestamp_millis() as f64 / 1000.0,
        uptime_seconds: state.start_time.elapsed().as_secs(),
        services,
        connected_clients: state.sse.client_count(),
    }))
}

async fn probe(client: Arc<ServiceClient>) -> String {
    match client.probe().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(service = %client.kind(), "health: probe failed: {}", e);
            format!("error: {e}")
        }
    }
}
