// Common DTOs and error mapping for the public API
//
// Every endpoint returns the `{success, data | error}` envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use taskforge_core::OrchestratorError;

/// Response envelope: `data` on success, `error` otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

/// Error half of the envelope, carrying its HTTP status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<serde_json::Value> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        let status = match &e {
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::InvalidState(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::Cancelled(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %e, "request failed");
        }
        Self::new(status, e.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        tracing::error!(error = %e, "request failed");
        Self::internal(e.to_string())
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_absent_halves() {
        let ok = ApiResponse {
            success: true,
            data: Some(serde_json::json!({"id": 1})),
            error: None,
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());

        let err = ApiResponse::<serde_json::Value> {
            success: false,
            data: None,
            error: Some("boom".to_string()),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn orchestrator_error_status_mapping() {
        let e = ApiError::from(OrchestratorError::NotFound(5));
        assert_eq!(e.status, StatusCode::NOT_FOUND);

        let e = ApiError::from(OrchestratorError::invalid_state("nope"));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);

        let e = ApiError::from(OrchestratorError::store("db down"));
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
