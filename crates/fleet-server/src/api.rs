//! Operational HTTP endpoints

use axum::{extract::State, routing::get, Json, Router};
use fleet_sdk::{FleetEngine, MetricsSnapshot};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FleetEngine>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub transport: String,
    pub partners: usize,
}

/// Create the router
pub fn create_router(engine: Arc<FleetEngine>) -> Router {
    let state = AppState { engine };

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = &state.engine;
    let status = if engine.is_stopped() {
        "stopping"
    } else if engine.is_started() {
        "healthy"
    } else {
        "starting"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        transport: engine.transport().name().to_string(),
        partners: engine.adapter().partners().len(),
    })
}

/// Counter and histogram snapshot
async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.engine.metrics_snapshot())
}
