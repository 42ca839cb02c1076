use axum::http::{HeaderName, Method, header};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use mcp_jira_confluence::auth::{CONFLUENCE_TOKEN_HEADER, JIRA_TOKEN_HEADER};
use mcp_jira_confluence::config::GatewayConfig;
use mcp_jira_confluence::lifecycle;
use mcp_jira_confluence::state::AppState;

fn build_app(state: AppState) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(JIRA_TOKEN_HEADER),
            HeaderName::from_static(CONFLUENCE_TOKEN_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(86_400));

    mcp_jira_confluence::create_router(state)
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    let config = match GatewayConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{}", e);
            tracing::error!("Please set the environment variables or create a .env file");
            std::process::exit(1);
        }
    };

    tracing::info!(
        jira = %config.issue_tracker.base_url,
        confluence = %config.wiki.base_url,
        heartbeat_secs = config.heartbeat_interval.as_secs(),
        "configuration loaded"
    );

    let state = AppState::from_config(&config);
    lifecycle::startup(&state).await;

    let app = build_app(state.clone());

    // Failing to bind is the only fatal condition.
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("MCP Jira/Confluence gateway listening on http://{}", listener.local_addr()?);

    let signal_state = state.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            lifecycle::shutdown_signal().await;
            lifecycle::drain_streams(&signal_state);
        })
        .await;

    lifecycle::shutdown(&state).await;
    served?;

    Ok(())
}
