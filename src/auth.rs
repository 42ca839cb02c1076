// Per-request credential overrides.
//
// Clients may authenticate every call on their own behalf instead of using the
// gateway's configured service accounts:
//   - `Authorization: Bearer <token>` applies to both services,
//   - `X-Jira-Token` / `X-Confluence-Token` apply to one service and win over
//     the bearer token for that service.
// Resolution is pure: it derives new `ServiceConfig` values and never touches
// the process-wide default clients.

use std::fmt;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

use crate::upstream::{ServiceConfig, ServiceKind};

pub const JIRA_TOKEN_HEADER: &str = "x-jira-token";
pub const CONFLUENCE_TOKEN_HEADER: &str = "x-confluence-token";

/// Raw auth material carried by one inbound HTTP request.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub bearer: Option<String>,
    pub issue_tracker_token: Option<String>,
    pub wiki_token: Option<String>,
}

impl AuthContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let bearer = header_str(headers, AUTHORIZATION.as_str())
            .and_then(|h| h.strip_prefix("Bearer "))
            .and_then(non_empty);

        Self {
            bearer,
            issue_tracker_token: header_str(headers, JIRA_TOKEN_HEADER).and_then(non_empty),
            wiki_token: header_str(headers, CONFLUENCE_TOKEN_HEADER).and_then(non_empty),
        }
    }

    /// Effective token for `kind`: the service header, else the bearer token.
    pub fn token_for(&self, kind: ServiceKind) -> Option<&str> {
        let specific = match kind {
            ServiceKind::IssueTracker => self.issue_tracker_token.as_deref(),
            ServiceKind::Wiki => self.wiki_token.as_deref(),
        };
        specific.or(self.bearer.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.bearer.is_none() && self.issue_tracker_token.is_none() && self.wiki_token.is_none()
    }

    /// Fill every field this context lacks from `fallback`.
    pub fn or_else(self, fallback: &AuthContext) -> AuthContext {
        AuthContext {
            bearer: self.bearer.or_else(|| fallback.bearer.clone()),
            issue_tracker_token: self
                .issue_tracker_token
                .or_else(|| fallback.issue_tracker_token.clone()),
            wiki_token: self.wiki_token.or_else(|| fallback.wiki_token.clone()),
        }
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("AuthContext")
            .field("bearer", &mask(&self.bearer))
            .field("issue_tracker_token", &mask(&self.issue_tracker_token))
            .field("wiki_token", &mask(&self.wiki_token))
            .finish()
    }
}

/// Per-service configs derived for one call. `None` means "use the default client".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub issue_tracker: Option<ServiceConfig>,
    pub wiki: Option<ServiceConfig>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        self.issue_tracker.is_none() && self.wiki.is_none()
    }
}

/// Derive override configs from `auth`, copying URL and TLS settings from the defaults.
pub fn resolve(auth: &AuthContext, issue_tracker: &ServiceConfig, wiki: &ServiceConfig) -> Overrides {
    Overrides {
        issue_tracker: auth
            .token_for(ServiceKind::IssueTracker)
            .map(|t| issue_tracker.with_token(t)),
        wiki: auth.token_for(ServiceKind::Wiki).map(|t| wiki.with_token(t)),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
