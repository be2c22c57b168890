// Lifecycle events emitted to UI subscribers
//
// Events are persisted with a per-workflow sequence number and streamed over
// SSE; payloads carry the workflow id plus the mutated fields.

use serde_json::{json, Value};

/// An event on the `workflow-<id>` channel.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    WorkflowUpdated {
        workflow_id: i64,
        status: String,
    },
    WorkflowPaused {
        workflow_id: i64,
        reason: Option<String>,
    },
    WorkflowUnpaused {
        workflow_id: i64,
    },
    WorkflowFailed {
        workflow_id: i64,
        error: String,
    },
    AgentUpdated {
        workflow_id: i64,
        agent_execution_id: i64,
        agent_type: String,
        status: String,
    },
    ArtifactCreated {
        workflow_id: i64,
        artifact_id: i64,
        artifact_type: String,
    },
    MessageNew {
        workflow_id: i64,
        message_id: i64,
        message_type: String,
        action_type: String,
    },
}

impl WorkflowEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowUpdated { .. } => "workflow:updated",
            WorkflowEvent::WorkflowPaused { .. } => "workflow:paused",
            WorkflowEvent::WorkflowUnpaused { .. } => "workflow:unpaused",
            WorkflowEvent::WorkflowFailed { .. } => "workflow:failed",
            WorkflowEvent::AgentUpdated { .. } => "agent:updated",
            WorkflowEvent::ArtifactCreated { .. } => "artifact:created",
            WorkflowEvent::MessageNew { .. } => "message:new",
        }
    }

    pub fn workflow_id(&self) -> i64 {
        match self {
            WorkflowEvent::WorkflowUpdated { workflow_id, .. }
            | WorkflowEvent::WorkflowPaused { workflow_id, .. }
            | WorkflowEvent::WorkflowUnpaused { workflow_id }
            | WorkflowEvent::WorkflowFailed { workflow_id, .. }
            | WorkflowEvent::AgentUpdated { workflow_id, .. }
            | WorkflowEvent::ArtifactCreated { workflow_id, .. }
            | WorkflowEvent::MessageNew { workflow_id, .. } => *workflow_id,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            WorkflowEvent::WorkflowUpdated {
                workflow_id,
                status,
            } => json!({
                "workflow_id": workflow_id,
                "status": status,
            }),
            WorkflowEvent::WorkflowPaused {
                workflow_id,
                reason,
            } => json!({
                "workflow_id": workflow_id,
                "is_paused": true,
                "pause_reason": reason,
            }),
            WorkflowEvent::WorkflowUnpaused { workflow_id } => json!({
                "workflow_id": workflow_id,
                "is_paused": false,
            }),
            WorkflowEvent::WorkflowFailed { workflow_id, error } => json!({
                "workflow_id": workflow_id,
                "status": "failed",
                "error": error,
            }),
            WorkflowEvent::AgentUpdated {
                workflow_id,
                agent_execution_id,
                agent_type,
                status,
            } => json!({
                "workflow_id": workflow_id,
                "agent_execution_id": agent_execution_id,
                "agent_type": agent_type,
                "status": status,
            }),
            WorkflowEvent::ArtifactCreated {
                workflow_id,
                artifact_id,
                artifact_type,
            } => json!({
                "workflow_id": workflow_id,
                "artifact_id": artifact_id,
                "artifact_type": artifact_type,
            }),
            WorkflowEvent::MessageNew {
                workflow_id,
                message_id,
                message_type,
                action_type,
            } => json!({
                "workflow_id": workflow_id,
                "message_id": message_id,
                "message_type": message_type,
                "action_type": action_type,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_are_channel_names() {
        let event = WorkflowEvent::WorkflowPaused {
            workflow_id: 3,
            reason: Some("manual".to_string()),
        };
        assert_eq!(event.event_type(), "workflow:paused");
        assert_eq!(event.workflow_id(), 3);
    }

    #[test]
    fn payload_carries_mutated_fields() {
        let event = WorkflowEvent::WorkflowFailed {
            workflow_id: 11,
            error: "agent timeout".to_string(),
        };
        let payload = event.to_json();
        assert_eq!(payload["workflow_id"], 11);
        assert_eq!(payload["status"], "failed");
        assert_eq!(payload["error"], "agent timeout");
    }

    #[test]
    fn unpause_payload() {
        let event = WorkflowEvent::WorkflowUnpaused { workflow_id: 5 };
        assert_eq!(event.event_type(), "workflow:unpaused");
        assert_eq!(event.to_json()["is_paused"], false);
    }
}
