// Process lifecycle: upstream sessions are opened at startup and closed at
// shutdown. Neither phase is fatal; a broken upstream only degrades the
// tools that need it.

use crate::state::AppState;

/// Open both upstream sessions, logging and continuing on failure.
pub async fn startup(state: &AppState) {
    tracing::info!("Starting SSE server...");

    for client in [&state.issue_tracker, &state.wiki] {
        match client.get_session().await {
            Ok(_) => tracing::info!(service = %client.kind(), "upstream client initialized"),
            Err(e) => tracing::warn!(service = %client.kind(), "failed to initialize upstream client: {}", e),
        }
    }

    tracing::info!("SSE server startup complete");
}

/// End every open SSE stream. Runs before the server waits for in-flight
/// connections to drain, since SSE responses never finish on their own.
pub fn drain_streams(state: &AppState) {
    let closed = state.sse.close_all();
    if closed > 0 {
        tracing::info!("closed {} SSE stream(s)", closed);
    }
}

/// Close both upstream clients. Safe to call more than once.
pub async fn shutdown(state: &AppState) {
    tracing::info!("Shutting down SSE server...");
    drain_streams(state);

    for client in [&state.issue_tracker, &state.wiki] {
        if client.close().await {
            tracing::info!(service = %client.kind(), "upstream client closed");
        }
    }

    tracing::info!("SSE server shut down successfully");
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
