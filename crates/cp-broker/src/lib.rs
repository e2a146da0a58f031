//! # Checkpoint realtime broker
//!
//! Development stand-in for the backend's STOMP relay. Serves STOMP over
//! WebSocket (plain or SockJS framing) at `/ws`, fans published payloads out
//! to subscribers and exposes a small HTTP API for publishing test events.
//! Nothing is persisted and nobody is authenticated.

pub mod api;
pub mod ws;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state available to all handlers.
pub struct AppState {
    pub config: cp_common::AppConfig,
    pub registry: ws::registry::ConnectionRegistry,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: cp_common::AppConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: ws::registry::ConnectionRegistry::new(),
            started_at: Utc::now(),
        })
    }
}

/// Build the full router: STOMP endpoints plus `/api`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api::router(state.clone()))
        .merge(ws::router(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
