// Database models (internal, may differ from public DTOs)

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Workflow row from database
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowRow {
    pub id: i64,
    pub workflow_type: String,
    pub target_module: String,
    pub status: String,
    pub payload: serde_json::Value,
    pub plan_json: Option<serde_json::Value>,
    pub branch_name: Option<String>,
    pub parent_workflow_id: Option<i64>,
    pub workflow_depth: i32,
    pub execution_order: i32,
    pub auto_execute_children: bool,
    pub is_paused: bool,
    pub pause_reason: Option<String>,
    pub checkpoint_commit: Option<String>,
    pub checkpoint_created_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRow {
    /// Task description from the payload, empty when the client sent none.
    pub fn task_description(&self) -> String {
        self.payload
            .get("task_description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

/// Input for creating a workflow
#[derive(Debug, Clone)]
pub struct CreateWorkflow {
    pub workflow_type: String,
    pub target_module: String,
    pub payload: serde_json::Value,
    pub branch_name: Option<String>,
    pub auto_execute_children: bool,
}

/// Queue entry row from database
#[derive(Debug, Clone, FromRow)]
pub struct QueueEntryRow {
    pub id: i64,
    pub parent_workflow_id: i64,
    pub child_workflow_id: i64,
    pub execution_order: i32,
    pub status: String,
    pub depends_on: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueEntryRow {
    /// The sibling execution orders this entry depends on.
    pub fn depends_on_orders(&self) -> Vec<i32> {
        self.depends_on
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_i64().map(|n| n as i32))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Agent execution row from database
#[derive(Debug, Clone, FromRow)]
pub struct AgentExecutionRow {
    pub id: i64,
    pub workflow_id: i64,
    pub agent_type: String,
    pub status: String,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an agent execution
#[derive(Debug, Clone)]
pub struct CreateAgentExecution {
    pub workflow_id: i64,
    pub agent_type: String,
    pub input: serde_json::Value,
}

/// Artifact row from database. Append-only.
#[derive(Debug, Clone, FromRow)]
pub struct ArtifactRow {
    pub id: i64,
    pub workflow_id: i64,
    pub agent_execution_id: i64,
    pub artifact_type: String,
    pub file_path: Option<String>,
    pub content: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an artifact
#[derive(Debug, Clone)]
pub struct CreateArtifact {
    pub workflow_id: i64,
    pub agent_execution_id: i64,
    pub artifact_type: String,
    pub file_path: Option<String>,
    pub content: String,
    pub metadata: serde_json::Value,
}

/// Conversation message row from database
#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub workflow_id: i64,
    pub agent_execution_id: Option<i64>,
    pub message_type: String,
    pub agent_type: Option<String>,
    pub content: String,
    pub metadata: serde_json::Value,
    pub action_type: String,
    pub action_status: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a message
#[derive(Debug, Clone)]
pub struct CreateMessage {
    pub workflow_id: i64,
    pub agent_execution_id: Option<i64>,
    pub message_type: String,
    pub agent_type: Option<String>,
    pub content: String,
    pub metadata: serde_json::Value,
    pub action_type: String,
    pub action_status: String,
}

/// Execution log row from database. Append-only, streamed to the UI.
#[derive(Debug, Clone, FromRow)]
pub struct ExecutionLogRow {
    pub id: i64,
    pub workflow_id: i64,
    pub agent_execution_id: Option<i64>,
    pub log_level: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an execution log
#[derive(Debug, Clone)]
pub struct CreateExecutionLog {
    pub workflow_id: i64,
    pub agent_execution_id: Option<i64>,
    pub log_level: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

/// Event row from database (SSE notification stream)
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: i64,
    pub workflow_id: i64,
    pub sequence: i32,
    pub event_type: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an event
#[derive(Debug, Clone)]
pub struct CreateEventRow {
    pub workflow_id: i64,
    pub event_type: String,
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with_depends(depends_on: serde_json::Value) -> QueueEntryRow {
        QueueEntryRow {
            id: 1,
            parent_workflow_id: 1,
            child_workflow_id: 2,
            execution_order: 0,
            status: "pending".to_string(),
            depends_on,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn depends_on_orders_parses_array() {
        let entry = entry_with_depends(serde_json::json!([0, 2]));
        assert_eq!(entry.depends_on_orders(), vec![0, 2]);
    }

    #[test]
    fn depends_on_orders_empty_for_non_array() {
        let entry = entry_with_depends(serde_json::Value::Null);
        assert!(entry.depends_on_orders().is_empty());
    }

    #[test]
    fn task_description_from_payload() {
        let row = WorkflowRow {
            id: 1,
            workflow_type: "feature".to_string(),
            target_module: "billing".to_string(),
            status: "pending".to_string(),
            payload: serde_json::json!({"task_description": "add invoices"}),
            plan_json: None,
            branch_name: None,
            parent_workflow_id: None,
            workflow_depth: 0,
            execution_order: 0,
            auto_execute_children: true,
            is_paused: false,
            pause_reason: None,
            checkpoint_commit: None,
            checkpoint_created_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        };
        assert_eq!(row.task_description(), "add invoices");
    }
}
