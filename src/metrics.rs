// Optional Prometheus metrics.
//
// Compiled in with the default `metrics` feature. Without it `/metrics`
// answers with an "unavailable" payload and the request middleware is a
// pass-through.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::state::AppState;

#[cfg(feature = "metrics")]
mod imp {
    use prometheus_client::encoding::EncodeLabelSet;
    use prometheus_client::encoding::text::encode;
    use prometheus_client::metrics::counter::Counter;
    use prometheus_client::metrics::family::Family;
    use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
    use prometheus_client::registry::Registry;

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct RequestLabels {
        method: String,
        status: String,
    }

    pub struct Metrics {
        registry: Registry,
        requests: Family<RequestLabels, Counter>,
        duration: Histogram,
    }

    impl Metrics {
        pub fn new() -> Self {
            let mut registry = Registry::default();
            let requests = Family::<RequestLabels, Counter>::default();
            // 5ms .. ~10s
            let duration = Histogram::new(exponential_buckets(0.005, 2.0, 12));

            // Counters get the `_total` suffix on encode.
            registry.register("mcp_requests", "Total MCP requests", requests.clone());
            registry.register("mcp_request_duration_seconds", "Request duration", duration.clone());

            Self {
                registry,
                requests,
                duration,
            }
        }

        pub fn observe(&self, method: &str, status: u16, seconds: f64) {
            self.requests
                .get_or_create(&RequestLabels {
                    method: method.to_string(),
                    status: status.to_string(),
                })
                .inc();
            self.duration.observe(seconds);
        }

        pub fn render(&self) -> Result<String, std::fmt::Error> {
            let mut out = String::new();
            encode(&mut out, &self.registry)?;
            Ok(out)
        }
    }

    impl Default for Metrics {
        fn default() -> Self {
            Self::new()
        }
    }
}

#[cfg(not(feature = "metrics"))]
mod imp {
    /// Uninhabited: metrics support is compiled out.
    pub enum Metrics {}

    impl Metrics {
        pub fn observe(&self, _method: &str, _status: u16, _seconds: f64) {
            match *self {}
        }

        pub fn render(&self) -> Result<String, std::fmt::Error> {
            match *self {}
        }
    }
}

pub use imp::Metrics;

/// Startup capability check.
#[cfg(feature = "metrics")]
pub fn init() -> Option<Arc<Metrics>> {
    tracing::debug!("metrics: prometheus collectors registered");
    Some(Arc::new(Metrics::new()))
}

/// Startup capability check.
#[cfg(not(feature = "metrics"))]
pub fn init() -> Option<Arc<Metrics>> {
    tracing::info!("metrics: disabled (prometheus support not compiled in)");
    None
}

/// Counts and times every HTTP request when metrics are available.
pub async fn track_metrics(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(metrics) = state.metrics.clone() else {
        return next.run(request).await;
    };

    let method = request.method().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    metrics.observe(&method, response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}

/// `GET /metrics`
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    let Some(metrics) = state.metrics.as_ref() else {
        return Json(json!({ "error": "Metrics not available - prometheus support is disabled" })).into_response();
    };

    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/openmetrics-text; version=1.0.0; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("metrics: failed to encode: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Failed to encode metrics: {e}") })),
            )
                .into_response()
        }
    }
}
