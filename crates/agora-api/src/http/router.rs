//! Axum router configuration with middleware.
//!
//! Routes: `GET /ws/{identity}` (WebSocket chat) and `GET /health`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::extract::State;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::ws;
use crate::state::AppState;

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws/{identity}", get(ws::ws_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - liveness plus a snapshot of connection state.
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.registry.len(),
        "bus": state.bus.backend().to_string(),
        "listener_started": state.listener.is_started(),
    }))
}

#[cfg(test)]
mod tests {
    use agora_types::config::AgoraConfig;

    use super::*;

    #[tokio::test]
    async fn health_reports_status_and_backend() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::from_config(AgoraConfig::default(), dir.path())
            .await
            .unwrap();

        let axum::Json(body) = health_check(State(state)).await;

        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 0);
        assert_eq!(body["bus"], "memory");
        assert_eq!(body["listener_started"], false);
    }
}
