//! JSON-RPC 2.0 envelopes and MCP descriptors shared by `/mcp` and `/sse`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "mcp-jira-confluence";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const INVALID_PARAMS: i32 = -32602;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INTERNAL_ERROR: i32 = -32603;

// ── Inbound ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    /// An id-less `notifications/*` message; never answered. With an id it
    /// is an ordinary request and goes through method dispatch.
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.starts_with("notifications/")
    }

    pub fn id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }
}

// ── Outbound ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data,
            }),
        }
    }

    /// `-32603` with a human-readable `data` field.
    pub fn internal(id: Value, data: impl Into<String>) -> Self {
        Self::error(id, INTERNAL_ERROR, "Internal error", Some(Value::String(data.into())))
    }
}

/// Server-initiated message (no `id`).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

/// Terminal frame on an SSE stream; carries no `id`.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorFrame {
    pub jsonrpc: &'static str,
    pub error: JsonRpcError,
}

impl JsonRpcErrorFrame {
    pub fn new(message: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            error: JsonRpcError {
                code: INTERNAL_ERROR,
                message: message.into(),
                data: Some(Value::String(data.into())),
            },
        }
    }
}

// ── MCP descriptors ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

impl ToolContent {
    pub fn text(s: impl Into<String>) -> Self {
        ToolContent::Text { text: s.into() }
    }
}

// ── Server identity ─────────────────────────────────────────────────────────

pub fn capabilities() -> Value {
    json!({
        "experimental": {},
        "tools": { "listChanged": false },
        "resources": { "subscribe": false, "listChanged": false }
    })
}

pub fn server_info() -> Value {
    json!({ "name": SERVER_NAME, "version": SERVER_VERSION })
}

/// `initialize` result; also the body of the SSE handshake.
pub fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": capabilities(),
        "serverInfo": server_info(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_omits_error_field() {
        let v = serde_json::to_value(JsonRpcResponse::success(json!(7), json!({"ok": true}))).unwrap();
        assert_eq!(v, json!({"jsonrpc": "2.0", "id": 7, "result": {"ok": true}}));
    }

    #[test]
    fn error_keeps_null_id_and_omits_missing_data() {
        let v = serde_json::to_value(JsonRpcResponse::error(
            Value::Null,
            METHOD_NOT_FOUND,
            "Method not found: nope",
            None,
        ))
        .unwrap();
        assert_eq!(
            v,
            json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32601, "message": "Method not found: nope"}})
        );
    }

    #[test]
    fn request_defaults_params_and_id() {
        let req: JsonRpcRequest = serde_json::from_value(json!({"jsonrpc": "2.0", "method": "tools/list"})).unwrap();
        assert_eq!(req.id(), Value::Null);
        assert!(req.params.is_null());
        assert!(!req.is_notification());
    }

    #[test]
    fn notification_method_with_id_is_a_request() {
        let with_id: JsonRpcRequest =
            serde_json::from_value(json!({"id": 5, "method": "notifications/initialized"})).unwrap();
        assert!(!with_id.is_notification());

        let without_id: JsonRpcRequest =
            serde_json::from_value(json!({"method": "notifications/initialized"})).unwrap();
        assert!(without_id.is_notification());
    }

    #[test]
    fn error_frame_has_no_id() {
        let v = serde_json::to_value(JsonRpcErrorFrame::new("Internal error", "queue closed")).unwrap();
        assert!(v.get("id").is_none());
        assert_eq!(v["error"]["code"], INTERNAL_ERROR);
    }

    #[test]
    fn tool_content_serializes_with_type_tag() {
        let v = serde_json::to_value(ToolContent::text("hi")).unwrap();
        assert_eq!(v, json!({"type": "text", "text": "hi"}));
    }
}
