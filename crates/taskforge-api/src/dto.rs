// Public DTOs and the status rollup computations
//
// Rows stay internal to storage; these are the wire shapes. The
// effective-status rollup and resume-step computation are pure functions so
// they can be tested without a database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use taskforge_core::{agent_sequence, AgentType, WorkflowType};
use taskforge_storage::{
    AgentExecutionRow, ArtifactRow, ExecutionLogRow, MessageRow, QueueEntryRow, WorkflowRow,
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowDto {
    pub id: i64,
    pub workflow_type: String,
    pub target_module: String,
    pub status: String,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_json: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_workflow_id: Option<i64>,
    pub workflow_depth: i32,
    pub execution_order: i32,
    pub auto_execute_children: bool,
    pub is_paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_created_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<WorkflowRow> for WorkflowDto {
    fn from(row: WorkflowRow) -> Self {
        Self {
            id: row.id,
            workflow_type: row.workflow_type,
            target_module: row.target_module,
            status: row.status,
            payload: row.payload,
            plan_json: row.plan_json,
            branch_name: row.branch_name,
            parent_workflow_id: row.parent_workflow_id,
            workflow_depth: row.workflow_depth,
            execution_order: row.execution_order,
            auto_execute_children: row.auto_execute_children,
            is_paused: row.is_paused,
            pause_reason: row.pause_reason,
            checkpoint_commit: row.checkpoint_commit,
            checkpoint_created_at: row.checkpoint_created_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        }
    }
}

/// Listing shape: the workflow plus (optionally) its immediate children.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowSummaryDto {
    #[serde(flatten)]
    pub workflow: WorkflowDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<WorkflowDto>>,
}

/// Detail shape for GET /workflows/:id.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowDetailDto {
    #[serde(flatten)]
    pub workflow: WorkflowDto,
    /// Stored status rolled up with the subtree's statuses.
    pub effective_status: String,
    pub agents: Vec<AgentExecutionDto>,
    pub artifacts: Vec<ArtifactDto>,
    pub children: Vec<WorkflowDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentExecutionDto {
    pub id: i64,
    pub workflow_id: i64,
    pub agent_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<AgentExecutionRow> for AgentExecutionDto {
    fn from(row: AgentExecutionRow) -> Self {
        Self {
            id: row.id,
            workflow_id: row.workflow_id,
            agent_type: row.agent_type,
            status: row.status,
            output: row.output,
            error_message: row.error_message,
            retry_count: row.retry_count,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArtifactDto {
    pub id: i64,
    pub workflow_id: i64,
    pub agent_execution_id: i64,
    pub artifact_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub content: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<ArtifactRow> for ArtifactDto {
    fn from(row: ArtifactRow) -> Self {
        Self {
            id: row.id,
            workflow_id: row.workflow_id,
            agent_execution_id: row.agent_execution_id,
            artifact_type: row.artifact_type,
            file_path: row.file_path,
            content: row.content,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageDto {
    pub id: i64,
    pub workflow_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_execution_id: Option<i64>,
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    pub content: String,
    pub metadata: serde_json::Value,
    pub action_type: String,
    pub action_status: String,
    pub created_at: DateTime<Utc>,
}

impl From<MessageRow> for MessageDto {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            workflow_id: row.workflow_id,
            agent_execution_id: row.agent_execution_id,
            message_type: row.message_type,
            agent_type: row.agent_type,
            content: row.content,
            metadata: row.metadata,
            action_type: row.action_type,
            action_status: row.action_status,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExecutionLogDto {
    pub id: i64,
    pub workflow_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_execution_id: Option<i64>,
    pub log_level: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<ExecutionLogRow> for ExecutionLogDto {
    fn from(row: ExecutionLogRow) -> Self {
        Self {
            id: row.id,
            workflow_id: row.workflow_id,
            agent_execution_id: row.agent_execution_id,
            log_level: row.log_level,
            message: row.message,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueueEntryDto {
    pub id: i64,
    pub parent_workflow_id: i64,
    pub child_workflow_id: i64,
    pub execution_order: i32,
    pub status: String,
    pub depends_on: Vec<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<QueueEntryRow> for QueueEntryDto {
    fn from(row: QueueEntryRow) -> Self {
        let depends_on = row.depends_on_orders();
        Self {
            id: row.id,
            parent_workflow_id: row.parent_workflow_id,
            child_workflow_id: row.child_workflow_id,
            execution_order: row.execution_order,
            status: row.status,
            depends_on,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

/// A committed checkpoint inside a subtree.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckpointDto {
    pub workflow_id: i64,
    pub checkpoint_commit: String,
    pub checkpoint_created_at: DateTime<Utc>,
    pub target_module: String,
}

/// Whether a workflow can be resumed, and from which agent step.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResumeStateDto {
    pub can_resume: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_from_step: Option<String>,
}

/// Roll a stored status up with its descendants: a failed descendant wins,
/// an incomplete one shows in_progress, otherwise the stored status stands.
pub fn effective_status(stored: &str, descendant_statuses: &[&str]) -> String {
    if descendant_statuses.iter().any(|s| *s == "failed") {
        return "failed".to_string();
    }
    let incomplete = descendant_statuses
        .iter()
        .any(|s| !matches!(*s, "completed" | "failed" | "cancelled"));
    if incomplete {
        return "in_progress".to_string();
    }
    stored.to_string()
}

/// The first agent in the type's sequence without a completed execution.
pub fn resume_step(
    workflow_type: WorkflowType,
    completed_agent_types: &[String],
) -> Option<AgentType> {
    agent_sequence(workflow_type)
        .iter()
        .find(|agent| !completed_agent_types.iter().any(|c| c == &agent.to_string()))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_descendant_dominates() {
        assert_eq!(
            effective_status("running", &["completed", "failed", "pending"]),
            "failed"
        );
    }

    #[test]
    fn incomplete_descendant_shows_in_progress() {
        assert_eq!(
            effective_status("running", &["completed", "coding"]),
            "in_progress"
        );
        assert_eq!(
            effective_status("running", &["completed", "pending"]),
            "in_progress"
        );
    }

    #[test]
    fn stored_status_stands_when_subtree_settled() {
        assert_eq!(
            effective_status("completed", &["completed", "cancelled"]),
            "completed"
        );
        assert_eq!(effective_status("pending", &[]), "pending");
    }

    #[test]
    fn resume_step_skips_completed_prefix() {
        let completed = vec!["plan".to_string(), "code".to_string()];
        assert_eq!(
            resume_step(WorkflowType::Feature, &completed),
            Some(AgentType::SecurityLint)
        );
    }

    #[test]
    fn resume_step_none_when_sequence_done() {
        let completed = vec!["document".to_string()];
        assert_eq!(resume_step(WorkflowType::Documentation, &completed), None);
    }

    #[test]
    fn resume_step_full_sequence_from_start() {
        assert_eq!(
            resume_step(WorkflowType::Bugfix, &[]),
            Some(AgentType::Plan)
        );
    }
}
