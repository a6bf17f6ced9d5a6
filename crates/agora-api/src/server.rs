//! Server lifecycle: start the bus listener, serve until shutdown, then wind
//! down in order.
//!
//! Shutdown order: stop accepting connections, cancel the bus listener, close
//! every registered session, wait for the connection tasks to flush their
//! queued lines, close the database pools.

use std::future::Future;
use std::time::Duration;

use agora_core::listener::ListenerStats;
use tokio::net::TcpListener;

use crate::http::router::build_router;
use crate::state::AppState;

/// Upper bound on waiting for connection tasks to finish at shutdown.
pub const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// What was wound down at shutdown.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownReport {
    pub listener: ListenerStats,
    pub sessions_closed: usize,
}

/// Serve the chat endpoint on `tcp` until `shutdown` resolves.
pub async fn run_server(
    state: AppState,
    tcp: TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<ShutdownReport> {
    let listener = state.listener.start()?;
    let router = build_router(state.clone());

    let served = axum::serve(tcp, router)
        .with_graceful_shutdown(shutdown)
        .await;

    let stats = listener.shutdown().await;
    let sessions_closed = state.registry.close_all();

    state.connections.close();
    if tokio::time::timeout(CONNECTION_DRAIN_TIMEOUT, state.connections.wait())
        .await
        .is_err()
    {
        tracing::warn!(
            remaining = state.connections.len(),
            "connection tasks still running after drain timeout"
        );
    }

    state.db_pool.close().await;
    served?;

    tracing::info!(
        sessions_closed,
        events_delivered = stats.events_delivered,
        "server stopped"
    );
    Ok(ShutdownReport {
        listener: stats,
        sessions_closed,
    })
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
