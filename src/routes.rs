//! HTTP route configuration
//!
//! Two endpoints: a health probe and the session WebSocket upgrade.

use std::sync::Arc;

use axum::{Json, Router, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::ws::ws_handler;
use crate::state::AppState;

/// Create the application router
///
/// # Endpoints
///
/// - `GET /health` - liveness probe
/// - `GET /ws` - WebSocket upgrade for the voice session protocol
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

/// Liveness probe
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
