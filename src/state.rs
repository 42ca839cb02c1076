// Application state shared by every handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::{self, AuthContext};
use crate::config::GatewayConfig;
use crate::mcp::dispatcher::{AtlassianDispatcher, Dispatcher, ExecutionContext};
use crate::mcp::sse::SseHub;
use crate::metrics::{self, Metrics};
use crate::upstream::{ServiceClient, ServiceConfig, ServiceKind};

/// Central application state. Clone-friendly; everything shared sits behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Default Jira client, used when a request carries no override.
    pub issue_tracker: Arc<ServiceClient>,
    /// Default Confluence client.
    pub wiki: Arc<ServiceClient>,
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Connected SSE clients.
    pub sse: Arc<SseHub>,
    /// `None` when metrics are compiled out or failed to register at startup.
    pub metrics: Option<Arc<Metrics>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(issue_tracker: ServiceConfig, wiki: ServiceConfig, heartbeat_interval: Duration) -> Self {
        Self {
            issue_tracker: Arc::new(ServiceClient::new(ServiceKind::IssueTracker, issue_tracker)),
            wiki: Arc::new(ServiceClient::new(ServiceKind::Wiki, wiki)),
            dispatcher: Arc::new(AtlassianDispatcher),
            sse: Arc::new(SseHub::new(heartbeat_interval)),
            metrics: metrics::init(),
            start_time: Instant::now(),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.issue_tracker.clone(),
            config.wiki.clone(),
            config.heartbeat_interval,
        )
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Build the execution context for one call.
    ///
    /// Overridden services get a brand-new client that lives only as long as
    /// the returned context; the defaults are shared and never modified.
    pub fn execution_context(&self, auth: &AuthContext) -> ExecutionContext {
        let overrides = auth::resolve(auth, self.issue_tracker.config(), self.wiki.config());
        ExecutionContext {
            issue_tracker: overrides
                .issue_tracker
                .map(|cfg| Arc::new(ServiceClient::new(ServiceKind::IssueTracker, cfg)))
                .unwrap_or_else(|| self.issue_tracker.clone()),
            wiki: overrides
                .wiki
                .map(|cfg| Arc::new(ServiceClient::new(ServiceKind::Wiki, cfg)))
                .unwrap_or_else(|| self.wiki.clone()),
        }
    }

    /// Close any per-request clients in `ctx`, leaving the defaults alone.
    pub async fn release_context(&self, ctx: ExecutionContext) {
        if !Arc::ptr_eq(&ctx.issue_tracker, &self.issue_tracker) {
            ctx.issue_tracker.close().await;
        }
        if !Arc::ptr_eq(&ctx.wiki, &self.wiki) {
            ctx.wiki.close().await;
        }
    }
}
