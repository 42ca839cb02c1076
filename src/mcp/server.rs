//! JSON-RPC request processor and the synchronous `/mcp` endpoint.
//!
//! Supported methods:
//! - `initialize`: protocol version, capabilities, server identity
//! - `ping`: empty result
//! - `notifications/*` without an `id`: client acks, never answered
//! - `tools/list`: the dispatcher's tool catalog
//! - `tools/call`: run one tool against the request's execution context
//! - `resources/list`: resources visible through the request's execution context
//!
//! Every request that reaches a method branch gets exactly one response
//! envelope carrying its `id`. Failures, including panics inside the
//! dispatcher, become `-32603` envelopes and never escape to the transport.

use std::panic::AssertUnwindSafe;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use serde_json::{Value, json};

use super::dispatcher::{DispatchError, ExecutionContext};
use super::types::{INVALID_PARAMS, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND, initialize_result};
use crate::auth::AuthContext;
use crate::state::AppState;

/// `POST /mcp`: one envelope in, one envelope out.
pub async fn mcp_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let auth = AuthContext::from_headers(&headers);
    match handle_payload(&state, &auth, &body).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        // Notification ack, same shape the MCP HTTP transport expects.
        None => (StatusCode::OK, Json(json!({}))).into_response(),
    }
}

/// Parse a raw body and process it. Unparseable input yields `-32603` with a null id.
pub async fn handle_payload(state: &AppState, auth: &AuthContext, body: &[u8]) -> Option<JsonRpcResponse> {
    match serde_json::from_slice::<Value>(body) {
        Ok(envelope) => process_request(state, auth, envelope).await,
        Err(e) => {
            tracing::warn!("MCP: unparseable request body: {}", e);
            Some(JsonRpcResponse::internal(Value::Null, format!("Parse error: {e}")))
        }
    }
}

/// Process one decoded envelope. Returns `None` for notifications.
pub async fn process_request(state: &AppState, auth: &AuthContext, envelope: Value) -> Option<JsonRpcResponse> {
    let raw_id = envelope.get("id").cloned().unwrap_or(Value::Null);
    let request: JsonRpcRequest = match serde_json::from_value(envelope) {
        Ok(r) => r,
        Err(e) => return Some(JsonRpcResponse::internal(raw_id, format!("Invalid request: {e}"))),
    };

    if request.is_notification() {
        tracing::debug!(method = %request.method, "MCP: notification received");
        return None;
    }

    let id = request.id();
    tracing::debug!(method = %request.method, "MCP: incoming request");

    let response = match request.method.as_str() {
        "initialize" => JsonRpcResponse::success(id, initialize_result()),
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => JsonRpcResponse::success(id, json!({ "tools": state.dispatcher.tools() })),
        "tools/call" => handle_tools_call(state, auth, id, &request.params).await,
        "resources/list" => handle_resources_list(state, auth, id).await,
        other => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {other}"), None),
    };
    Some(response)
}

// ── tools/call ──────────────────────────────────────────────────────────────

async fn handle_tools_call(state: &AppState, auth: &AuthContext, id: Value, params: &Value) -> JsonRpcResponse {
    let Some(name) = params.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing 'name' in params", None);
    };
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    tracing::info!(tool = %name, "MCP: tools/call");

    let outcome = with_context(state, auth, |ctx| async move {
        state.dispatcher.call_tool(&ctx, name, &arguments).await
    })
    .await;

    match outcome {
        Ok(content) => JsonRpcResponse::success(id, json!({ "content": content, "isError": false })),
        Err(e) => {
            tracing::error!(tool = %name, "MCP: tool call failed: {}", e);
            JsonRpcResponse::internal(id, format!("Tool execution failed: {e}"))
        }
    }
}

// ── resources/list ──────────────────────────────────────────────────────────

async fn handle_resources_list(state: &AppState, auth: &AuthContext, id: Value) -> JsonRpcResponse {
    let outcome = with_context(state, auth, |ctx| async move { state.dispatcher.list_resources(&ctx).await }).await;

    match outcome {
        Ok(resources) => JsonRpcResponse::success(id, json!({ "resources": resources })),
        Err(e) => {
            tracing::error!("MCP: resources/list failed: {}", e);
            JsonRpcResponse::internal(id, format!("Failed to get resources: {e}"))
        }
    }
}

// ── Execution context scope ─────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum ScopeError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("dispatcher panicked: {0}")]
    Panicked(String),
}

/// Run `f` with the execution context resolved for `auth`.
///
/// The context is a value owned by this call; per-request clients are closed
/// afterwards whether `f` succeeds, fails or panics.
async fn with_context<F, Fut, T>(state: &AppState, auth: &AuthContext, f: F) -> Result<T, ScopeError>
where
    F: FnOnce(ExecutionContext) -> Fut,
    Fut: Future<Output = Result<T, DispatchError>>,
{
    let ctx = state.execution_context(auth);
    let outcome = AssertUnwindSafe(f(ctx.clone())).catch_unwind().await;
    state.release_context(ctx).await;

    match outcome {
        Ok(result) => result.map_err(ScopeError::from),
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ScopeError::Panicked(msg))
        }
    }
}
