// Shared helpers for the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use mcp_jira_confluence::mcp::dispatcher::{DispatchError, Dispatcher, ExecutionContext};
use mcp_jira_confluence::mcp::types::{ResourceDescriptor, ToolContent, ToolDescriptor};
use mcp_jira_confluence::state::AppState;
use mcp_jira_confluence::upstream::{Credential, ServiceClient, ServiceConfig};

pub const JIRA_DEFAULT: &str = "jira-default";
pub const WIKI_DEFAULT: &str = "wiki-default";

/// Port 1 on loopback: connections are refused immediately.
pub const UNREACHABLE: &str = "http://127.0.0.1:1";

pub fn state_with(jira_url: &str, wiki_url: &str, heartbeat: Duration) -> AppState {
    AppState::new(
        ServiceConfig::new(jira_url, Credential::Token(JIRA_DEFAULT.into()), true),
        ServiceConfig::new(wiki_url, Credential::Token(WIKI_DEFAULT.into()), true),
        heartbeat,
    )
}

/// State whose dispatcher reports the credentials it was called with.
pub fn recording_state() -> AppState {
    state_with(UNREACHABLE, UNREACHABLE, Duration::from_secs(30))
        .with_dispatcher(std::sync::Arc::new(RecordingDispatcher))
}

pub fn app(state: AppState) -> Router {
    mcp_jira_confluence::create_router(state)
}

/// Collect a response body into a `serde_json::Value`.
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn post_raw(state: &AppState, uri: &str, body: &str, headers: &[(&str, &str)]) -> axum::response::Response {
    let mut req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (k, v) in headers {
        req = req.header(*k, *v);
    }
    app(state.clone())
        .oneshot(req.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

/// POST an envelope to `/mcp` and decode the reply.
pub async fn rpc(state: &AppState, envelope: Value, headers: &[(&str, &str)]) -> Value {
    let response = post_raw(state, "/mcp", &envelope.to_string(), headers).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

pub async fn get(state: &AppState, uri: &str) -> axum::response::Response {
    app(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Text of the first content item of a `tools/call` result, parsed as JSON.
pub fn tool_text_json(reply: &Value) -> Value {
    let text = reply["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

// ── Fake dispatcher ─────────────────────────────────────────────────────────

fn token_of(client: &ServiceClient) -> String {
    client
        .config()
        .credential
        .token()
        .unwrap_or("<basic>")
        .to_string()
}

/// Tools:
/// - `whoami {delay_ms?}`: reports the context's tokens, read before and after an optional sleep
/// - `fail`: returns an error
/// - `panic`: panics
pub struct RecordingDispatcher;

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    fn tools(&self) -> Vec<ToolDescriptor> {
        ["whoami", "fail", "panic"]
            .into_iter()
            .map(|name| ToolDescriptor {
                name: name.to_string(),
                description: format!("test tool {name}"),
                input_schema: json!({ "type": "object", "properties": {} }),
            })
            .collect()
    }

    async fn call_tool(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        arguments: &Value,
    ) -> Result<Vec<ToolContent>, DispatchError> {
        match name {
            "whoami" => {
                let before = (token_of(&ctx.issue_tracker), token_of(&ctx.wiki));
                if let Some(ms) = arguments.get("delay_ms").and_then(Value::as_u64) {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
                let after = (token_of(&ctx.issue_tracker), token_of(&ctx.wiki));
                Ok(vec![ToolContent::text(
                    json!({ "jira": after.0, "confluence": after.1, "stable": before == after }).to_string(),
                )])
            }
            "fail" => Err(DispatchError::InvalidArguments("boom".into())),
            "panic" => panic!("dispatcher exploded"),
            other => Err(DispatchError::UnknownTool(other.to_string())),
        }
    }

    async fn list_resources(&self, ctx: &ExecutionContext) -> Result<Vec<ResourceDescriptor>, DispatchError> {
        Ok(vec![ResourceDescriptor {
            uri: "test://whoami".into(),
            name: "whoami".into(),
            description: format!("{}|{}", token_of(&ctx.issue_tracker), token_of(&ctx.wiki)),
            mime_type: "application/json".into(),
        }])
    }
}

// ── Fake upstream ───────────────────────────────────────────────────────────

/// Serve the endpoints the health probes hit; returns the base URL.
pub async fn spawn_fake_upstream() -> String {
    let router = Router::new()
        .route(
            "/rest/api/2/serverInfo",
            axum::routing::get(|| async { axum::Json(json!({ "version": "9.12.0", "serverTitle": "Jira" })) }),
        )
        .route(
            "/rest/api/space",
            axum::routing::get(|| async { axum::Json(json!({ "results": [], "size": 0 })) }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// ── SSE reader ──────────────────────────────────────────────────────────────

/// Reads `data:` events off a streaming response body.
pub struct SseReader {
    body: Body,
    buf: String,
}

impl SseReader {
    pub fn new(response: axum::response::Response) -> Self {
        Self {
            body: response.into_body(),
            buf: String::new(),
        }
    }

    /// Next event's data as JSON; panics if nothing arrives within `within`.
    pub async fn next_json(&mut self, within: Duration) -> Value {
        tokio::time::timeout(within, self.read_event())
            .await
            .expect("timed out waiting for SSE event")
    }

    async fn read_event(&mut self) -> Value {
        loop {
            if let Some(pos) = self.buf.find("\n\n") {
                let block: String = self.buf.drain(..pos + 2).collect();
                let data: Vec<&str> = block
                    .lines()
                    .filter_map(|l| l.strip_prefix("data:").map(str::trim_start))
                    .collect();
                if data.is_empty() {
                    continue;
                }
                return serde_json::from_str(&data.join("\n")).unwrap();
            }

            let frame = self
                .body
                .frame()
                .await
                .expect("SSE stream ended")
                .expect("SSE body error");
            if let Ok(bytes) = frame.into_data() {
                self.buf.push_str(std::str::from_utf8(&bytes).unwrap());
            }
        }
    }
}
