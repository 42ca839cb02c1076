//! Integration tests for the SSE transport (`POST /sse`, `POST /sse/messages`).

mod common;

use std::time::Duration;

use axum::http::{StatusCode, header};
use serde_json::json;

use common::*;
use mcp_jira_confluence::state::AppState;

const WAIT: Duration = Duration::from_secs(5);

async fn open_stream(state: &AppState, headers: &[(&str, &str)]) -> SseReader {
    let response = post_raw(state, "/sse", "", headers).await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"), "got {content_type}");
    SseReader::new(response)
}

#[tokio::test]
async fn first_event_is_the_handshake() {
    let state = recording_state();
    let mut stream = open_stream(&state, &[]).await;

    let hello = stream.next_json(WAIT).await;
    assert_eq!(hello["jsonrpc"], "2.0");
    assert_eq!(hello["method"], "notifications/initialized");
    assert_eq!(hello["params"]["protocolVersion"], "2024-11-05");
    assert_eq!(hello["params"]["serverInfo"]["name"], "mcp-jira-confluence");
    assert!(hello["params"]["sessionId"].is_string());
    assert!(hello.get("id").is_none());
    assert_eq!(state.sse.client_count(), 1);
}

#[tokio::test]
async fn idle_stream_gets_heartbeats() {
    let state = state_with(UNREACHABLE, UNREACHABLE, Duration::from_millis(100));
    let mut stream = open_stream(&state, &[]).await;
    stream.next_json(WAIT).await;

    let beat = stream.next_json(WAIT).await;
    assert_eq!(beat["method"], "notifications/heartbeat");
    assert!(beat["params"]["timestamp"].as_f64().unwrap() > 0.0);

    let again = stream.next_json(WAIT).await;
    assert_eq!(again["method"], "notifications/heartbeat");
}

#[tokio::test]
async fn broadcast_reaches_every_stream() {
    let state = recording_state();
    let mut first = open_stream(&state, &[]).await;
    let mut second = open_stream(&state, &[]).await;
    first.next_json(WAIT).await;
    second.next_json(WAIT).await;

    let message = json!({ "jsonrpc": "2.0", "method": "notifications/message", "params": { "n": 1 } });
    assert_eq!(state.sse.broadcast(&message).unwrap(), 2);

    assert_eq!(first.next_json(WAIT).await, message);
    assert_eq!(second.next_json(WAIT).await, message);
}

#[tokio::test]
async fn dropping_the_stream_deregisters_the_client() {
    let state = recording_state();
    let mut stream = open_stream(&state, &[]).await;
    stream.next_json(WAIT).await;
    assert_eq!(state.sse.client_count(), 1);

    drop(stream);
    assert_eq!(state.sse.client_count(), 0);
}

#[tokio::test]
async fn unpolled_stream_is_deregistered_on_drop() {
    let state = recording_state();
    let response = post_raw(&state, "/sse", "", &[]).await;
    assert_eq!(state.sse.client_count(), 1);

    drop(response);
    assert_eq!(state.sse.client_count(), 0);
}

#[tokio::test]
async fn close_all_ends_open_streams() {
    let state = recording_state();
    let mut stream = open_stream(&state, &[]).await;
    stream.next_json(WAIT).await;

    assert_eq!(state.sse.close_all(), 1);

    let last = stream.next_json(WAIT).await;
    assert_eq!(last["error"]["code"], -32603);
    assert_eq!(last["error"]["data"], "SSE session closed");
}

#[tokio::test]
async fn messages_are_answered_on_the_stream_with_its_credentials() {
    let state = recording_state();
    let mut stream = open_stream(&state, &[("authorization", "Bearer stream-token")]).await;
    let hello = stream.next_json(WAIT).await;
    let session_id = hello["params"]["sessionId"].as_str().unwrap().to_string();

    let envelope = json!({
        "jsonrpc": "2.0",
        "id": 42,
        "method": "tools/call",
        "params": { "name": "whoami", "arguments": {} }
    });
    let response = post_raw(
        &state,
        &format!("/sse/messages?session_id={session_id}"),
        &envelope.to_string(),
        &[],
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["status"], "accepted");

    let reply = stream.next_json(WAIT).await;
    assert_eq!(reply["id"], 42);
    let who = tool_text_json(&reply);
    assert_eq!(who["jira"], "stream-token");
    assert_eq!(who["confluence"], "stream-token");
}

#[tokio::test]
async fn message_headers_override_the_stream_credentials() {
    let state = recording_state();
    let mut stream = open_stream(&state, &[("authorization", "Bearer stream-token")]).await;
    let hello = stream.next_json(WAIT).await;
    let session_id = hello["params"]["sessionId"].as_str().unwrap().to_string();

    let envelope = json!({
        "jsonrpc": "2.0",
        "id": 43,
        "method": "tools/call",
        "params": { "name": "whoami" }
    });
    let response = post_raw(
        &state,
        &format!("/sse/messages?session_id={session_id}"),
        &envelope.to_string(),
        &[("x-jira-token", "message-token")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let who = tool_text_json(&stream.next_json(WAIT).await);
    assert_eq!(who["jira"], "message-token");
    assert_eq!(who["confluence"], "stream-token");
}

#[tokio::test]
async fn message_for_unknown_session_is_404() {
    let state = recording_state();
    let response = post_raw(
        &state,
        "/sse/messages?session_id=00000000-0000-4000-8000-000000000000",
        r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
        &[],
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
