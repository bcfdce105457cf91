//! HTTP route handlers.
//!
//! The local API is read-only: health probes, the receiver display state and
//! the sender WebSocket upgrade.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::protocol_constants::{SERVICE_ID, WS_PATH};

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/status", get(get_status))
        .route(WS_PATH, get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness probe: "Is the process running?"
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_ID,
    }))
}

/// Readiness probe: "Can a sender attach?"
///
/// Returns 503 with details once the session has ended or before the server
/// knows its address.
async fn readiness_check(State(state): State<AppState>) -> Response {
    let port = state.network.get_port();
    let local_ip = state.network.get_local_ip();

    let port_ready = port > 0;
    let ip_ready = !local_ip.is_empty();
    let session_ready = !state.session.is_ended();
    let ready = port_ready && ip_ready && session_ready;

    let body = json!({
        "status": if ready { "ready" } else { "not_ready" },
        "ready": ready,
        "checks": {
            "port": { "ready": port_ready, "value": port },
            "localIp": { "ready": ip_ready, "value": local_ip },
            "session": { "ready": session_ready },
            "senderAttached": state.sender.is_claimed(),
        }
    });

    if ready {
        Json(body).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

/// What the receiver is currently showing.
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.receiver_state.to_json())
}
