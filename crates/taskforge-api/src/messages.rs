// Conversation thread HTTP routes
//
// Posting a user message with an actionable type (pause/cancel/redirect/
// instruction) enqueues it pending; the runner consumes it before its next
// agent step.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;

use taskforge_core::{ActionStatus, ActionType, MessageType, WorkflowEvent};
use taskforge_storage::CreateMessage;

use crate::common::{ApiError, ApiResponse, ApiResult};
use crate::dto::MessageDto;
use crate::state::AppState;

/// Request to post a message on a workflow's thread.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    pub content: String,
    /// Defaults to a plain comment.
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListMessagesParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    200
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/workflows/:id/messages",
            get(list_messages).post(create_message),
        )
        .with_state(state)
}

/// GET /workflows/:id/messages - Conversation thread, oldest first
#[utoipa::path(
    get,
    path = "/workflows/{id}/messages",
    params(
        ("id" = i64, Path, description = "Workflow ID"),
        ("limit" = Option<i64>, Query, description = "Max messages (default 200)")
    ),
    responses(
        (status = 200, description = "Messages"),
        (status = 404, description = "Workflow not found")
    ),
    tag = "messages"
)]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<ListMessagesParams>,
) -> ApiResult<Vec<MessageDto>> {
    ensure_exists(&state, id).await?;
    let rows = state.db.messages_for_workflow(id, params.limit).await?;
    Ok(ApiResponse::ok(rows.into_iter().map(Into::into).collect()))
}

/// POST /workflows/:id/messages - Post a user message (may carry an action)
#[utoipa::path(
    post,
    path = "/workflows/{id}/messages",
    request_body = CreateMessageRequest,
    params(("id" = i64, Path, description = "Workflow ID")),
    responses(
        (status = 201, description = "Message created"),
        (status = 400, description = "Unknown action type"),
        (status = 404, description = "Workflow not found")
    ),
    tag = "messages"
)]
pub async fn create_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MessageDto>>), ApiError> {
    ensure_exists(&state, id).await?;

    let action_type = match req.action_type.as_deref() {
        Some(raw) => raw
            .parse::<ActionType>()
            .map_err(|e: String| ApiError::bad_request(e))?,
        None => ActionType::Comment,
    };
    // Actionable messages start pending and are consumed between agent steps.
    let action_status = if action_type.is_actionable() {
        ActionStatus::Pending
    } else {
        ActionStatus::Processed
    };

    let row = state
        .db
        .create_message(CreateMessage {
            workflow_id: id,
            agent_execution_id: None,
            message_type: MessageType::User.to_string(),
            agent_type: None,
            content: req.content,
            metadata: req.metadata.unwrap_or_else(|| serde_json::json!({})),
            action_type: action_type.to_string(),
            action_status: action_status.to_string(),
        })
        .await?;

    state
        .events
        .publish(WorkflowEvent::MessageNew {
            workflow_id: id,
            message_id: row.id,
            message_type: row.message_type.clone(),
            action_type: row.action_type.clone(),
        })
        .await;

    Ok((StatusCode::CREATED, ApiResponse::ok(MessageDto::from(row))))
}

async fn ensure_exists(state: &AppState, id: i64) -> Result<(), ApiError> {
    state
        .db
        .get_workflow(id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found(format!("workflow {} not found", id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_request_defaults_to_comment() {
        let req: CreateMessageRequest =
            serde_json::from_str(r#"{"content": "looks good"}"#).unwrap();
        assert_eq!(req.action_type, None);
        assert!(req.metadata.is_none());
    }

    #[test]
    fn message_request_with_action() {
        let req: CreateMessageRequest =
            serde_json::from_str(r#"{"content": "", "actionType": "pause"}"#).unwrap();
        assert_eq!(req.action_type.as_deref(), Some("pause"));
    }
}
