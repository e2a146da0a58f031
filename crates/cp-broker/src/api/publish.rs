//! HTTP publish endpoint for pushing test events to subscribers.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use cp_common::{AppError, AppResult};
use cp_protocol::{CheckpointUpdate, GroupStatusUpdate, HelpQueueUpdate, Topic, TopicKind};

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/publish", post(publish))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub destination: String,
    pub payload: Value,
}

async fn publish(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PublishRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let topic = Topic::parse(&req.destination)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown destination: {}", req.destination)))?;
    validate_payload(topic.kind(), &req.payload)?;

    let delivered = state
        .registry
        .publish(topic.destination(), &req.payload.to_string());
    tracing::info!(destination = %topic, delivered, "Published via HTTP");

    Ok((StatusCode::ACCEPTED, Json(json!({ "delivered": delivered }))))
}

/// Reject payloads the topic's subscribers could not decode.
/// The legacy topic carries any JSON.
fn validate_payload(kind: TopicKind, payload: &Value) -> AppResult<()> {
    let result = match kind {
        TopicKind::Checkpoint => CheckpointUpdate::deserialize(payload).map(drop),
        TopicKind::GroupStatus => GroupStatusUpdate::deserialize(payload).map(drop),
        TopicKind::HelpQueue => HelpQueueUpdate::deserialize(payload).map(drop),
        TopicKind::Legacy => Ok(()),
    };
    result.map_err(|e| AppError::BadRequest(format!("Invalid payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_payload() {
        let checkpoint = json!({
            "labId": "L1",
            "groupId": "g1",
            "checkpointNumber": 1,
            "status": "RETURN",
            "timestamp": "2024-03-01T10:00:00Z"
        });
        assert!(validate_payload(TopicKind::Checkpoint, &checkpoint).is_ok());
        assert!(validate_payload(TopicKind::GroupStatus, &checkpoint).is_err());
        assert!(validate_payload(TopicKind::Legacy, &json!([1, 2, 3])).is_ok());

        let zero = json!({
            "labId": "L1",
            "groupId": "g1",
            "checkpointNumber": 0,
            "status": "PASS",
            "timestamp": "2024-03-01T10:00:00Z"
        });
        assert!(matches!(
            validate_payload(TopicKind::Checkpoint, &zero),
            Err(AppError::BadRequest(_))
        ));
    }
}
