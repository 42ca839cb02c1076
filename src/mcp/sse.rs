//! Server-Sent Events transport.
//!
//! `POST /sse` registers a client with the [`SseHub`] and streams, in order:
//! one `notifications/initialized` handshake, then queued messages as they
//! arrive, with a `notifications/heartbeat` whenever the queue stays idle for
//! the heartbeat interval. A closed queue ends the stream with one error frame.
//!
//! `POST /sse/messages?session_id=...` runs a JSON-RPC envelope through the
//! request processor using the auth captured when that stream was opened and
//! delivers the response on that stream only.
//!
//! Deregistration is tied to a guard owned by the stream, so it happens
//! exactly once on every exit path: normal end, error frame, client
//! disconnect, or shutdown.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use super::server::handle_payload;
use super::types::{JsonRpcErrorFrame, JsonRpcNotification, initialize_result};
use crate::auth::{self, AuthContext};
use crate::state::AppState;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

type Message = Arc<str>;

struct SseClient {
    queue: UnboundedSender<Message>,
    auth: AuthContext,
}

/// Receiving half of one registration, owned by the streaming response.
pub struct ClientHandle {
    pub id: Uuid,
    receiver: UnboundedReceiver<Message>,
}

#[derive(Debug, thiserror::Error)]
pub enum SseSendError {
    #[error("no SSE session {0}")]
    UnknownSession(Uuid),
    #[error("SSE session {0} is no longer receiving")]
    Disconnected(Uuid),
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ── Hub ─────────────────────────────────────────────────────────────────────

/// Registry of connected SSE clients, one unbounded FIFO queue each.
///
/// Uses `std::sync::Mutex`: the lock is never held across an await.
pub struct SseHub {
    clients: Mutex<HashMap<Uuid, SseClient>>,
    heartbeat_interval: Duration,
}

impl SseHub {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            heartbeat_interval,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, SseClient>> {
        self.clients.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add_client(&self, auth: AuthContext) -> ClientHandle {
        let (queue, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.lock().insert(id, SseClient { queue, auth });
        ClientHandle { id, receiver }
    }

    /// Idempotent; returns whether `id` was still registered.
    pub fn remove_client(&self, id: Uuid) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn client_count(&self) -> usize {
        self.lock().len()
    }

    pub fn auth_for(&self, id: Uuid) -> Option<AuthContext> {
        self.lock().get(&id).map(|c| c.auth.clone())
    }

    /// Serialize once and enqueue to every client. A dead client is logged and
    /// skipped. Returns how many clients accepted the message.
    pub fn broadcast<T: Serialize>(&self, message: &T) -> Result<usize, SseSendError> {
        let payload: Message = serde_json::to_string(message)?.into();
        let clients = self.lock();
        let mut delivered = 0;
        for (id, client) in clients.iter() {
            match client.queue.send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::error!(client = %id, "SSE: failed to enqueue broadcast, client gone"),
            }
        }
        Ok(delivered)
    }

    /// Enqueue to a single client.
    pub fn send_to<T: Serialize>(&self, id: Uuid, message: &T) -> Result<(), SseSendError> {
        let payload: Message = serde_json::to_string(message)?.into();
        let clients = self.lock();
        let client = clients.get(&id).ok_or(SseSendError::UnknownSession(id))?;
        client
            .queue
            .send(payload)
            .map_err(|_| SseSendError::Disconnected(id))
    }

    /// Drop every queue so open streams emit their terminal frame and end.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        drained.len()
    }
}

/// Removes its client from the hub when dropped.
struct Registration {
    hub: Arc<SseHub>,
    id: Uuid,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.hub.remove_client(self.id);
        tracing::info!(
            client = %self.id,
            "SSE client disconnected. Remaining clients: {}",
            self.hub.client_count()
        );
    }
}

// ── Stream ──────────────────────────────────────────────────────────────────

/// Serialize one frame body. A message that cannot be serialized is replaced
/// by an error frame so the stream still emits something well-formed.
fn encode<T: Serialize>(message: &T) -> String {
    serde_json::to_string(message).unwrap_or_else(|e| {
        let fallback = JsonRpcErrorFrame::new("Internal error", e.to_string());
        serde_json::to_string(&fallback).unwrap_or_default()
    })
}

fn frame<T: Serialize>(message: &T) -> Event {
    Event::default().data(encode(message))
}

fn handshake(session_id: Uuid) -> JsonRpcNotification {
    let mut params = initialize_result();
    params["sessionId"] = json!(session_id.to_string());
    JsonRpcNotification::new("notifications/initialized", params)
}

fn heartbeat() -> JsonRpcNotification {
    let now = chrono::Utc::now();
    let timestamp = now.timestamp_millis() as f64 / 1000.0;
    JsonRpcNotification::new("notifications/heartbeat", json!({ "timestamp": timestamp }))
}

/// The per-connection event stream. Takes ownership of the registration so
/// that dropping the stream (even unpolled) deregisters the client.
pub fn event_stream(hub: Arc<SseHub>, handle: ClientHandle) -> impl Stream<Item = Result<Event, Infallible>> {
    let ClientHandle { id, mut receiver } = handle;
    let interval = hub.heartbeat_interval();
    let registration = Registration { hub, id };

    async_stream::stream! {
        let _registration = registration;

        yield Ok(frame(&handshake(id)));

        loop {
            match tokio::time::timeout(interval, receiver.recv()).await {
                Ok(Some(message)) => yield Ok(Event::default().data(&*message)),
                Ok(None) => {
                    tracing::warn!(client = %id, "SSE: queue closed, ending stream");
                    yield Ok(frame(&JsonRpcErrorFrame::new("Internal error", "SSE session closed")));
                    break;
                }
                Err(_) => yield Ok(frame(&heartbeat())),
            }
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// `POST /sse`
pub async fn sse_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let auth = AuthContext::from_headers(&headers);
    let overrides = auth::resolve(&auth, state.issue_tracker.config(), state.wiki.config());

    let handle = state.sse.add_client(auth);
    tracing::info!(
        client = %handle.id,
        jira_override = overrides.issue_tracker.is_some(),
        confluence_override = overrides.wiki.is_some(),
        "New SSE client connected. Total clients: {}",
        state.sse.client_count()
    );

    Sse::new(event_stream(state.sse.clone(), handle))
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: Uuid,
}

/// `POST /sse/messages?session_id=<uuid>`
pub async fn message_handler(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(stored) = state.sse.auth_for(query.session_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Unknown SSE session: {}", query.session_id) })),
        )
            .into_response();
    };

    let auth = AuthContext::from_headers(&headers).or_else(&stored);
    let Some(response) = handle_payload(&state, &auth, &body).await else {
        return (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response();
    };

    match state.sse.send_to(query.session_id, &response) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response(),
        Err(e) => {
            tracing::error!("SSE: could not deliver response: {}", e);
            (StatusCode::GONE, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}
