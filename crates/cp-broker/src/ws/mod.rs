//! STOMP endpoints: plain WebSocket at `/ws`, SockJS below it.

mod framing;
pub mod registry;
mod stomp;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(cp_protocol::WS_PATH, get(stomp::stomp_ws_handler))
        .route("/ws/info", get(stomp::sockjs_info))
        .route(
            "/ws/{server}/{session}/websocket",
            get(stomp::sockjs_ws_handler),
        )
        .with_state(state)
}
