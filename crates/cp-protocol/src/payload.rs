//! JSON payloads pushed by the backend.
//!
//! Field names are camelCase and enum values SCREAMING_SNAKE_CASE on the
//! wire. Optional fields are omitted when absent.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckpointStatus {
    Pass,
    Return,
}

/// A checkpoint was signed off or returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointUpdate {
    pub lab_id: String,
    pub group_id: String,
    pub checkpoint_number: NonZeroU32,
    pub status: CheckpointStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_off_by: Option<String>,
    /// ISO-8601, passed through untouched.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_awarded: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupStatus {
    Forming,
    InProgress,
    Completed,
    SignedOff,
}

/// A group moved through its lab lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatusUpdate {
    pub lab_id: String,
    pub group_id: String,
    pub status: GroupStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<GroupStatus>,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_grade: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HelpQueueStatus {
    Waiting,
    Claimed,
    Resolved,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HelpQueuePriority {
    Normal,
    Urgent,
}

/// A help request entered, moved in, or left the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpQueueUpdate {
    pub id: String,
    pub lab_id: String,
    pub group_id: String,
    pub status: HelpQueueStatus,
    pub priority: HelpQueuePriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    pub requested_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checkpoint_update_wire_shape() {
        let body = json!({
            "labId": "l1",
            "groupId": "g1",
            "checkpointNumber": 3,
            "status": "PASS",
            "timestamp": "2024-01-01T00:00:00Z"
        });
        let update: CheckpointUpdate = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(update.checkpoint_number.get(), 3);
        assert_eq!(update.status, CheckpointStatus::Pass);
        assert_eq!(update.signed_off_by, None);
        assert_eq!(serde_json::to_value(&update).unwrap(), body);
    }

    #[test]
    fn test_checkpoint_number_must_be_positive() {
        let body = json!({
            "labId": "l1",
            "groupId": "g1",
            "checkpointNumber": 0,
            "status": "RETURN",
            "timestamp": "2024-01-01T00:00:00Z"
        });
        assert!(serde_json::from_value::<CheckpointUpdate>(body).is_err());
    }

    #[test]
    fn test_group_status_accepts_nulls_and_unknown_fields() {
        let body = json!({
            "labId": "l1",
            "groupId": "g1",
            "status": "SIGNED_OFF",
            "previousStatus": "IN_PROGRESS",
            "timestamp": "2024-01-01T10:00:00",
            "performedBy": null,
            "totalScore": 9.5,
            "somethingNew": true
        });
        let update: GroupStatusUpdate = serde_json::from_value(body).unwrap();
        assert_eq!(update.status, GroupStatus::SignedOff);
        assert_eq!(update.previous_status, Some(GroupStatus::InProgress));
        assert_eq!(update.performed_by, None);
        assert_eq!(update.total_score, Some(9.5));
    }

    #[test]
    fn test_help_queue_update() {
        let body = json!({
            "id": "h1",
            "labId": "l1",
            "groupId": "g1",
            "status": "CLAIMED",
            "priority": "URGENT",
            "position": 2,
            "requestedBy": "student@example.edu",
            "claimedBy": "ta@example.edu",
            "timestamp": "2024-01-01T00:00:00Z"
        });
        let update: HelpQueueUpdate = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(update.priority, HelpQueuePriority::Urgent);
        assert_eq!(update.status, HelpQueueStatus::Claimed);
        assert_eq!(serde_json::to_value(&update).unwrap(), body);
    }
}
