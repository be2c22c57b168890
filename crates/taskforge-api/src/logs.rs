// Execution log HTTP routes

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::common::{ApiError, ApiResponse, ApiResult};
use crate::dto::ExecutionLogDto;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListLogsParams {
    #[serde(default)]
    pub agent_execution_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    500
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/workflows/:id/logs", get(list_logs))
        .with_state(state)
}

/// GET /workflows/:id/logs - Execution logs, oldest first
#[utoipa::path(
    get,
    path = "/workflows/{id}/logs",
    params(
        ("id" = i64, Path, description = "Workflow ID"),
        ("agentExecutionId" = Option<i64>, Query, description = "Filter by agent execution"),
        ("limit" = Option<i64>, Query, description = "Max log lines (default 500)")
    ),
    responses(
        (status = 200, description = "Execution logs"),
        (status = 404, description = "Workflow not found")
    ),
    tag = "logs"
)]
pub async fn list_logs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<ListLogsParams>,
) -> ApiResult<Vec<ExecutionLogDto>> {
    state
        .db
        .get_workflow(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("workflow {} not found", id)))?;

    let rows = state
        .db
        .execution_logs(id, params.agent_execution_id, params.limit)
        .await?;
    Ok(ApiResponse::ok(rows.into_iter().map(Into::into).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_camel_case_and_defaults() {
        let params: ListLogsParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.agent_execution_id, None);
        assert_eq!(params.limit, 500);

        let params: ListLogsParams =
            serde_json::from_str(r#"{"agentExecutionId": 3, "limit": 10}"#).unwrap();
        assert_eq!(params.agent_execution_id, Some(3));
        assert_eq!(params.limit, 10);
    }
}
