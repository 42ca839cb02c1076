// Upstream service clients for Jira (issue tracker) and Confluence (wiki).
//
// Each client owns an immutable `ServiceConfig` and a lazily-created HTTP
// session. Per-request credential overrides never touch the default client:
// they build a fresh `ServiceConfig` via `with_token` and a fresh client.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ── Service identity ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    IssueTracker,
    Wiki,
}

impl ServiceKind {
    pub fn label(self) -> &'static str {
        match self {
            ServiceKind::IssueTracker => "jira",
            ServiceKind::Wiki => "confluence",
        }
    }

    /// Cheapest authenticated endpoint, used by health probes.
    fn probe_path(self) -> &'static str {
        match self {
            ServiceKind::IssueTracker => "/rest/api/2/serverInfo",
            ServiceKind::Wiki => "/rest/api/space",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Personal access token, sent as `Authorization: Bearer <token>`.
    Token(String),
    /// Username + API token, sent as HTTP basic auth.
    Basic { username: String, api_token: String },
}

impl Credential {
    /// The bearer token, if this credential is token-based.
    pub fn token(&self) -> Option<&str> {
        match self {
            Credential::Token(t) => Some(t),
            Credential::Basic { .. } => None,
        }
    }

    fn header_value(&self) -> Result<HeaderValue, reqwest::header::InvalidHeaderValue> {
        let raw = match self {
            Credential::Token(t) => format!("Bearer {t}"),
            Credential::Basic { username, api_token } => {
                format!("Basic {}", BASE64.encode(format!("{username}:{api_token}")))
            }
        };
        let mut value = HeaderValue::from_str(&raw)?;
        value.set_sensitive(true);
        Ok(value)
    }
}

// Secrets never reach the logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Token(_) => f.write_str("Token(***)"),
            Credential::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("api_token", &"***")
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub base_url: String,
    pub credential: Credential,
    pub ssl_verify: bool,
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>, credential: Credential, ssl_verify: bool) -> Self {
        Self {
            base_url: base_url.into(),
            credential,
            ssl_verify,
        }
    }

    /// Copy of this config with only the credential replaced by `token`.
    pub fn with_token(&self, token: &str) -> Self {
        Self {
            base_url: self.base_url.clone(),
            credential: Credential::Token(token.to_string()),
            ssl_verify: self.ssl_verify,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{0} credential is not a valid header value")]
    InvalidCredential(ServiceKind),

    #[error("failed to build {service} session: {source}")]
    Session {
        service: ServiceKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} request to {path} failed: {source}")]
    Http {
        service: ServiceKind,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned HTTP {status} for {path}")]
    Status {
        service: ServiceKind,
        path: String,
        status: u16,
    },
}

// ── Session ─────────────────────────────────────────────────────────────────

/// One authenticated HTTP session against an upstream service.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    http: reqwest::Client,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

// ── Client ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ServiceClient {
    kind: ServiceKind,
    config: ServiceConfig,
    session: Mutex<Option<Arc<Session>>>,
}

impl ServiceClient {
    pub fn new(kind: ServiceKind, config: ServiceConfig) -> Self {
        Self {
            kind,
            config,
            session: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Return the shared session, creating it on first use.
    ///
    /// Concurrent first callers serialize on the lock, so at most one session
    /// is ever built per open/close cycle.
    pub async fn get_session(&self) -> Result<Arc<Session>, UpstreamError> {
        let mut slot = self.session.lock().await;
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }

        let session = Arc::new(self.build_session()?);
        tracing::debug!(service = %self.kind, session = %session.id, "upstream session created");
        *slot = Some(session.clone());
        Ok(session)
    }

    pub async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Drop the session. Safe to call any number of times; returns whether a
    /// session was actually open.
    pub async fn close(&self) -> bool {
        let closed = self.session.lock().await.take();
        if let Some(session) = &closed {
            tracing::debug!(service = %self.kind, session = %session.id, "upstream session closed");
        }
        closed.is_some()
    }

    /// One authenticated round-trip to the service's cheapest endpoint.
    pub async fn probe(&self) -> Result<(), UpstreamError> {
        self.get_json(self.kind.probe_path(), &[("limit", "1".to_string())])
            .await
            .map(|_| ())
    }

    /// GET `path` relative to the base URL and decode the JSON body.
    pub async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, UpstreamError> {
        let session = self.get_session().await?;
        let http_err = |source| UpstreamError::Http {
            service: self.kind,
            path: path.to_string(),
            source,
        };

        let resp = session
            .http
            .get(self.config.url(path))
            .query(query)
            .send()
            .await
            .map_err(http_err)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                service: self.kind,
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        resp.json::<Value>().await.map_err(http_err)
    }

    fn build_session(&self) -> Result<Session, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            self.config
                .credential
                .header_value()
                .map_err(|_| UpstreamError::InvalidCredential(self.kind))?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!self.config.ssl_verify)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|source| UpstreamError::Session {
                service: self.kind,
                source,
            })?;

        Ok(Session {
            id: Uuid::new_v4(),
            http,
        })
    }
}
