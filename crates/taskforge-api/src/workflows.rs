// Workflow control HTTP routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use taskforge_core::{
    QueueEntryStatus, QueueStatus, WorkflowEvent, WorkflowStatus, WorkflowType, MAX_TREE_DEPTH,
};
use taskforge_storage::CreateWorkflow;

use crate::common::{ApiError, ApiResponse, ApiResult};
use crate::dto::{
    effective_status, resume_step, CheckpointDto, QueueEntryDto, ResumeStateDto,
    WorkflowDetailDto, WorkflowDto, WorkflowSummaryDto,
};
use crate::state::AppState;

/// Request to create and start a root workflow.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowRequest {
    #[schema(example = "feature")]
    pub workflow_type: String,
    #[schema(example = "billing")]
    pub target_module: String,
    #[schema(example = "Add invoice export")]
    pub task_description: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Request to create a sub-workflow under a parent.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateChildWorkflowRequest {
    pub workflow_type: String,
    pub target_module: String,
    pub task_description: String,
    /// Position in the parent's queue; defaults to the next free slot.
    #[serde(default)]
    pub execution_order: Option<i32>,
    /// Sibling execution orders that must complete first.
    #[serde(default)]
    pub depends_on: Vec<i32>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PauseRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResumeFromCheckpointRequest {
    #[serde(default)]
    pub checkpoint_workflow_id: Option<i64>,
}

/// Query parameters for listing workflows
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListWorkflowsParams {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub include_children: bool,
}

fn default_limit() -> i64 {
    20
}

/// Result of a checkpoint rewind.
#[derive(Debug, Clone, serde::Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RewindResultDto {
    pub checkpoint_workflow_id: i64,
    pub checkpoint_commit: String,
    pub target_module: String,
    pub reset_workflow_ids: Vec<i64>,
    pub removed_workflow_ids: Vec<i64>,
}

/// Queue inspection shape.
#[derive(Debug, Clone, serde::Serialize, Deserialize, ToSchema)]
pub struct QueueDto {
    pub status: QueueStatus,
    pub entries: Vec<QueueEntryDto>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/workflows/manual", post(create_workflow))
        .route("/workflows", get(list_workflows))
        .route(
            "/workflows/:id",
            get(get_workflow).delete(cancel_workflow),
        )
        .route("/workflows/:id/pause", post(pause_workflow))
        .route("/workflows/:id/unpause", post(unpause_workflow))
        .route("/workflows/:id/force-fail", post(force_fail_workflow))
        .route("/workflows/:id/resume", post(resume_workflow))
        .route("/workflows/:id/retry", post(retry_workflow))
        .route("/workflows/:id/skip", post(skip_workflow))
        .route("/workflows/:id/children", post(create_child_workflow))
        .route("/workflows/:id/queue", get(get_queue))
        .route("/workflows/:id/checkpoints", get(list_checkpoints))
        .route("/workflows/:id/last-checkpoint", get(last_checkpoint))
        .route(
            "/workflows/:id/resume-from-checkpoint",
            post(resume_from_checkpoint),
        )
        .route("/workflows/:id/resume-state", get(resume_state))
        .with_state(state)
}

/// POST /workflows/manual - Create and start a root workflow
#[utoipa::path(
    post,
    path = "/workflows/manual",
    request_body = CreateWorkflowRequest,
    responses(
        (status = 201, description = "Workflow created and started"),
        (status = 400, description = "Invalid workflow type"),
        (status = 500, description = "Internal server error")
    ),
    tag = "workflows"
)]
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<ApiResponse<WorkflowDto>>), ApiError> {
    let workflow_type: WorkflowType = req
        .workflow_type
        .parse()
        .map_err(|e: String| ApiError::bad_request(e))?;

    let mut payload = json!({ "task_description": req.task_description });
    if let Some(metadata) = req.metadata {
        payload["metadata"] = metadata;
    }

    let row = state
        .db
        .create_workflow(CreateWorkflow {
            workflow_type: workflow_type.to_string(),
            target_module: req.target_module,
            payload,
            branch_name: None,
            auto_execute_children: true,
        })
        .await?;

    state.executor.start_tree(row.id).await?;
    tracing::info!(workflow_id = row.id, workflow_type = %workflow_type, "manual workflow started");

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(WorkflowDto::from(row)),
    ))
}

/// GET /workflows - List root workflows
#[utoipa::path(
    get,
    path = "/workflows",
    params(
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("limit" = Option<i64>, Query, description = "Max number of results (default 20)"),
        ("offset" = Option<i64>, Query, description = "Offset for pagination"),
        ("include_children" = Option<bool>, Query, description = "Attach immediate sub-workflows")
    ),
    responses(
        (status = 200, description = "List of root workflows"),
        (status = 500, description = "Internal server error")
    ),
    tag = "workflows"
)]
pub async fn list_workflows(
    State(state): State<AppState>,
    Query(params): Query<ListWorkflowsParams>,
) -> ApiResult<Vec<WorkflowSummaryDto>> {
    let rows = state
        .db
        .list_root_workflows(params.status.as_deref(), params.limit, params.offset)
        .await?;

    let mut summaries = Vec::with_capacity(rows.len());
    for row in rows {
        let children = if params.include_children {
            let children = state.db.list_children(row.id).await?;
            Some(children.into_iter().map(WorkflowDto::from).collect())
        } else {
            None
        };
        summaries.push(WorkflowSummaryDto {
            workflow: WorkflowDto::from(row),
            children,
        });
    }

    Ok(ApiResponse::ok(summaries))
}

/// GET /workflows/:id - Workflow with agents, artifacts, and sub-workflows
#[utoipa::path(
    get,
    path = "/workflows/{id}",
    params(("id" = i64, Path, description = "Workflow ID")),
    responses(
        (status = 200, description = "Workflow detail"),
        (status = 404, description = "Workflow not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "workflows"
)]
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<WorkflowDetailDto> {
    let row = state
        .db
        .get_workflow(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("workflow {} not found", id)))?;

    let descendants = state.db.descendants(id).await?;
    let descendant_statuses: Vec<&str> = descendants.iter().map(|w| w.status.as_str()).collect();
    let rolled_up = effective_status(&row.status, &descendant_statuses);

    let agents = state.db.agent_executions_for_workflow(id).await?;
    let artifacts = state.db.artifacts_for_workflow(id).await?;
    let children = state.db.list_children(id).await?;

    Ok(ApiResponse::ok(WorkflowDetailDto {
        workflow: WorkflowDto::from(row),
        effective_status: rolled_up,
        agents: agents.into_iter().map(Into::into).collect(),
        artifacts: artifacts.into_iter().map(Into::into).collect(),
        children: children.into_iter().map(WorkflowDto::from).collect(),
    }))
}

/// DELETE /workflows/:id - Cancel (cooperative)
#[utoipa::path(
    delete,
    path = "/workflows/{id}",
    params(("id" = i64, Path, description = "Workflow ID")),
    responses(
        (status = 200, description = "Workflow cancelled"),
        (status = 400, description = "Workflow already terminal"),
        (status = 404, description = "Workflow not found")
    ),
    tag = "workflows"
)]
pub async fn cancel_workflow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    state.executor.cancel_workflow(id).await?;
    Ok(ApiResponse::ok(json!({ "id": id, "status": "cancelled" })))
}

/// POST /workflows/:id/pause
#[utoipa::path(
    post,
    path = "/workflows/{id}/pause",
    request_body = PauseRequest,
    params(("id" = i64, Path, description = "Workflow ID")),
    responses(
        (status = 200, description = "Workflow paused"),
        (status = 404, description = "Workflow not found")
    ),
    tag = "workflows"
)]
pub async fn pause_workflow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<PauseRequest>>,
) -> ApiResult<serde_json::Value> {
    ensure_exists(&state, id).await?;
    let reason = body.and_then(|Json(req)| req.reason);
    state.interrupts.pause(id, reason.as_deref()).await?;
    Ok(ApiResponse::ok(json!({ "id": id, "is_paused": true })))
}

/// POST /workflows/:id/unpause
#[utoipa::path(
    post,
    path = "/workflows/{id}/unpause",
    params(("id" = i64, Path, description = "Workflow ID")),
    responses(
        (status = 200, description = "Workflow unpaused"),
        (status = 404, description = "Workflow not found")
    ),
    tag = "workflows"
)]
pub async fn unpause_workflow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    ensure_exists(&state, id).await?;
    state.interrupts.unpause(id).await?;
    Ok(ApiResponse::ok(json!({ "id": id, "is_paused": false })))
}

/// POST /workflows/:id/force-fail - Operator override
#[utoipa::path(
    post,
    path = "/workflows/{id}/force-fail",
    params(("id" = i64, Path, description = "Workflow ID")),
    responses(
        (status = 200, description = "Workflow marked failed"),
        (status = 404, description = "Workflow not found")
    ),
    tag = "workflows"
)]
pub async fn force_fail_workflow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    ensure_exists(&state, id).await?;

    state
        .db
        .update_workflow_status(id, WorkflowStatus::Failed)
        .await?;
    if let Some(entry) = state.db.queue_entry_for_child(id).await? {
        state
            .db
            .update_queue_entry_status(entry.id, QueueEntryStatus::Failed, Some("force-failed"))
            .await?;
    }
    state
        .events
        .publish(WorkflowEvent::WorkflowFailed {
            workflow_id: id,
            error: "force-failed by operator".to_string(),
        })
        .await;

    Ok(ApiResponse::ok(json!({ "id": id, "status": "failed" })))
}

/// POST /workflows/:id/resume - Reset a terminal workflow and re-drive it
#[utoipa::path(
    post,
    path = "/workflows/{id}/resume",
    params(("id" = i64, Path, description = "Workflow ID")),
    responses(
        (status = 200, description = "Workflow reset and tree re-driven"),
        (status = 400, description = "Workflow not in a resumable state"),
        (status = 404, description = "Workflow not found")
    ),
    tag = "workflows"
)]
pub async fn resume_workflow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    let root_id = state.executor.resume_workflow(id).await?;
    Ok(ApiResponse::ok(json!({ "id": id, "root_id": root_id })))
}

/// POST /workflows/:id/retry
#[utoipa::path(
    post,
    path = "/workflows/{id}/retry",
    params(("id" = i64, Path, description = "Workflow ID")),
    responses(
        (status = 200, description = "Workflow reset and re-executed"),
        (status = 400, description = "Workflow not in a retryable state"),
        (status = 404, description = "Workflow not found")
    ),
    tag = "workflows"
)]
pub async fn retry_workflow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    let root_id = state.executor.retry_workflow(id).await?;
    Ok(ApiResponse::ok(json!({ "id": id, "root_id": root_id })))
}

/// POST /workflows/:id/skip - Non-root only
#[utoipa::path(
    post,
    path = "/workflows/{id}/skip",
    params(("id" = i64, Path, description = "Workflow ID")),
    responses(
        (status = 200, description = "Queue entry skipped, parent advanced"),
        (status = 400, description = "Cannot skip a root workflow"),
        (status = 404, description = "Workflow not found")
    ),
    tag = "workflows"
)]
pub async fn skip_workflow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    state.executor.skip_workflow(id).await?;
    Ok(ApiResponse::ok(json!({ "id": id, "skipped": true })))
}

/// POST /workflows/:id/children - Create a sub-workflow and its queue entry
#[utoipa::path(
    post,
    path = "/workflows/{id}/children",
    request_body = CreateChildWorkflowRequest,
    params(("id" = i64, Path, description = "Parent workflow ID")),
    responses(
        (status = 201, description = "Child workflow created"),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Parent not found")
    ),
    tag = "workflows"
)]
pub async fn create_child_workflow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<CreateChildWorkflowRequest>,
) -> Result<(StatusCode, Json<ApiResponse<WorkflowDto>>), ApiError> {
    let parent = state
        .db
        .get_workflow(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("workflow {} not found", id)))?;

    if parent.workflow_depth as usize + 1 > MAX_TREE_DEPTH {
        return Err(ApiError::bad_request(format!(
            "tree depth limit ({}) reached",
            MAX_TREE_DEPTH
        )));
    }

    let workflow_type: WorkflowType = req
        .workflow_type
        .parse()
        .map_err(|e: String| ApiError::bad_request(e))?;

    let entries = state.db.queue_entries(id).await?;
    let execution_order = req.execution_order.unwrap_or_else(|| {
        entries
            .iter()
            .map(|e| e.execution_order + 1)
            .max()
            .unwrap_or(0)
    });
    if entries.iter().any(|e| e.execution_order == execution_order) {
        return Err(ApiError::bad_request(format!(
            "execution order {} already taken",
            execution_order
        )));
    }
    // Dependencies must name existing-or-this-batch sibling orders.
    for dep in &req.depends_on {
        if *dep >= execution_order {
            return Err(ApiError::bad_request(format!(
                "dependency on order {} is not before order {}",
                dep, execution_order
            )));
        }
    }

    let mut payload = json!({ "task_description": req.task_description });
    if let Some(metadata) = req.metadata {
        payload["metadata"] = metadata;
    }

    let (child, _entry) = state
        .db
        .create_child_workflow(
            &parent,
            CreateWorkflow {
                workflow_type: workflow_type.to_string(),
                target_module: req.target_module,
                payload,
                branch_name: None,
                auto_execute_children: true,
            },
            execution_order,
            &req.depends_on,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(WorkflowDto::from(child)),
    ))
}

/// GET /workflows/:id/queue - Queue counts and entries
#[utoipa::path(
    get,
    path = "/workflows/{id}/queue",
    params(("id" = i64, Path, description = "Workflow ID")),
    responses(
        (status = 200, description = "Queue status"),
        (status = 404, description = "Workflow not found")
    ),
    tag = "workflows"
)]
pub async fn get_queue(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<QueueDto> {
    ensure_exists(&state, id).await?;
    let status = state.db.queue_status(id).await?;
    let entries = state.db.queue_entries(id).await?;
    Ok(ApiResponse::ok(QueueDto {
        status,
        entries: entries.into_iter().map(Into::into).collect(),
    }))
}

/// GET /workflows/:id/checkpoints - Committed checkpoints across the subtree
#[utoipa::path(
    get,
    path = "/workflows/{id}/checkpoints",
    params(("id" = i64, Path, description = "Workflow ID")),
    responses(
        (status = 200, description = "Checkpoints, most recent first"),
        (status = 404, description = "Workflow not found")
    ),
    tag = "checkpoints"
)]
pub async fn list_checkpoints(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<CheckpointDto>> {
    ensure_exists(&state, id).await?;
    let rows = state.db.subtree_checkpoints(id).await?;
    Ok(ApiResponse::ok(to_checkpoints(rows)))
}

/// GET /workflows/:id/last-checkpoint
#[utoipa::path(
    get,
    path = "/workflows/{id}/last-checkpoint",
    params(("id" = i64, Path, description = "Workflow ID")),
    responses(
        (status = 200, description = "Most recent checkpoint"),
        (status = 404, description = "No checkpoint in subtree")
    ),
    tag = "checkpoints"
)]
pub async fn last_checkpoint(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<CheckpointDto> {
    ensure_exists(&state, id).await?;
    let rows = state.db.subtree_checkpoints(id).await?;
    to_checkpoints(rows)
        .into_iter()
        .next()
        .map(ApiResponse::ok)
        .ok_or_else(|| ApiError::not_found(format!("no checkpoint in subtree of {}", id)))
}

/// POST /workflows/:id/resume-from-checkpoint - Rewind and re-drive
#[utoipa::path(
    post,
    path = "/workflows/{id}/resume-from-checkpoint",
    request_body = ResumeFromCheckpointRequest,
    params(("id" = i64, Path, description = "Workflow ID")),
    responses(
        (status = 200, description = "Tree rewound to checkpoint"),
        (status = 400, description = "No usable checkpoint"),
        (status = 404, description = "Workflow not found")
    ),
    tag = "checkpoints"
)]
pub async fn resume_from_checkpoint(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<ResumeFromCheckpointRequest>>,
) -> ApiResult<RewindResultDto> {
    ensure_exists(&state, id).await?;

    let checkpoint_workflow_id = body.and_then(|Json(req)| req.checkpoint_workflow_id);
    let outcome = state.rewind.rewind(id, checkpoint_workflow_id).await?;

    // Re-drive the tree so the reset checkpoint node executes again.
    let root_id = state.db.root_of(id).await?;
    state.executor.start_tree(root_id).await?;

    Ok(ApiResponse::ok(RewindResultDto {
        checkpoint_workflow_id: outcome.checkpoint_workflow_id,
        checkpoint_commit: outcome.checkpoint_commit,
        target_module: outcome.target_module,
        reset_workflow_ids: outcome.reset_workflow_ids,
        removed_workflow_ids: outcome.removed_workflow_ids,
    }))
}

/// GET /workflows/:id/resume-state - Can this workflow be resumed, and where from
#[utoipa::path(
    get,
    path = "/workflows/{id}/resume-state",
    params(("id" = i64, Path, description = "Workflow ID")),
    responses(
        (status = 200, description = "Resume state"),
        (status = 404, description = "Workflow not found")
    ),
    tag = "workflows"
)]
pub async fn resume_state(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ResumeStateDto> {
    let workflow = state
        .db
        .get_workflow(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("workflow {} not found", id)))?;

    let status: WorkflowStatus = workflow
        .status
        .parse()
        .map_err(|e: String| ApiError::internal(e))?;
    let can_resume = status.is_terminal();

    let resume_from_step = if can_resume {
        let workflow_type: WorkflowType = workflow
            .workflow_type
            .parse()
            .map_err(|e: String| ApiError::internal(e))?;
        let executions = state.db.agent_executions_for_workflow(id).await?;
        let completed: Vec<String> = executions
            .into_iter()
            .filter(|e| e.status == "completed")
            .map(|e| e.agent_type)
            .collect();
        resume_step(workflow_type, &completed).map(|agent| agent.to_string())
    } else {
        None
    };

    Ok(ApiResponse::ok(ResumeStateDto {
        can_resume,
        status: workflow.status,
        resume_from_step,
    }))
}

async fn ensure_exists(state: &AppState, id: i64) -> Result<(), ApiError> {
    state
        .db
        .get_workflow(id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found(format!("workflow {} not found", id)))
}

fn to_checkpoints(rows: Vec<taskforge_storage::WorkflowRow>) -> Vec<CheckpointDto> {
    rows.into_iter()
        .filter_map(|row| {
            let commit = row.checkpoint_commit?;
            let created_at = row.checkpoint_created_at?;
            Some(CheckpointDto {
                workflow_id: row.id,
                checkpoint_commit: commit,
                checkpoint_created_at: created_at,
                target_module: row.target_module,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_camel_case() {
        let json = r#"{"workflowType": "feature", "targetModule": "billing", "taskDescription": "X"}"#;
        let req: CreateWorkflowRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.workflow_type, "feature");
        assert_eq!(req.target_module, "billing");
        assert_eq!(req.task_description, "X");
        assert!(req.metadata.is_none());
    }

    #[test]
    fn create_request_with_metadata() {
        let json = r#"{"workflowType": "bugfix", "targetModule": "auth", "taskDescription": "Y", "metadata": {"priority": "high"}}"#;
        let req: CreateWorkflowRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.metadata.unwrap()["priority"], "high");
    }

    #[test]
    fn child_request_defaults() {
        let json = r#"{"workflowType": "review", "targetModule": "m", "taskDescription": "Z"}"#;
        let req: CreateChildWorkflowRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.execution_order, None);
        assert!(req.depends_on.is_empty());
    }

    #[test]
    fn checkpoint_request_optional_body_fields() {
        let req: ResumeFromCheckpointRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.checkpoint_workflow_id, None);

        let req: ResumeFromCheckpointRequest =
            serde_json::from_str(r#"{"checkpointWorkflowId": 9}"#).unwrap();
        assert_eq!(req.checkpoint_workflow_id, Some(9));
    }

    #[test]
    fn list_params_defaults() {
        let params: ListWorkflowsParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.limit, 20);
        assert_eq!(params.offset, 0);
        assert!(!params.include_children);
        assert!(params.status.is_none());
    }
}
