pub mod auth;
pub mod config;
pub mod handlers;
pub mod lifecycle;
pub mod mcp;
pub mod metrics;
pub mod state;
pub mod upstream;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

use state::AppState;

/// Build the application router with the given state.
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a network port.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Metadata / health / metrics
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/metrics", get(metrics::metrics_handler))
        // JSON-RPC request/response
        .route("/mcp", post(mcp::server::mcp_handler))
        // SSE stream + messages answered on it
        .route("/sse", post(mcp::sse::sse_handler))
        .route("/sse/messages", post(mcp::sse::message_handler))
        .layer(middleware::from_fn_with_state(state.clone(), metrics::track_metrics))
        .with_state(state)
}
