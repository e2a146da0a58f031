//! Health check endpoint.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "cp-broker",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.registry.connection_count(),
        "subscriptions": state.registry.subscription_count(),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
    }))
}
