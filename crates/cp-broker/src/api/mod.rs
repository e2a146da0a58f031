//! API routes module.

mod health;
mod publish;

use std::sync::Arc;

use axum::Router;

use crate::AppState;

/// Build the API router with all sub-routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(publish::router(state.clone()))
        .merge(health::router(state))
}
