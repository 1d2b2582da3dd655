use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;
use workflow_engine::WorkflowError;

/// Standard API error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Unique error ID for log correlation
    pub error_id: String,
    /// Machine-readable error type
    pub error_type: String,
    /// Human-readable error message
    pub message: String,
    /// Tasks blocking the requested transition, for `open_tasks_remain`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_task_ids: Option<Vec<Uuid>>,
    /// Timestamp when the error occurred
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Standard API success response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

/// Main API error enum
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Resource not found: {resource_type}")]
    NotFound { resource_type: String },

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ApiError {
    /// Create a simple validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(resource_type: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Workflow(err) => match err {
                WorkflowError::PatientNotFound(_)
                | WorkflowError::StatusNotFound(_)
                | WorkflowError::TransitionNotFound(_)
                | WorkflowError::TaskNotFound(_) => StatusCode::NOT_FOUND,
                WorkflowError::IllegalTransition { .. }
                | WorkflowError::OpenTasksRemain { .. }
                | WorkflowError::ApprovalRequired { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                WorkflowError::ConcurrentModification(_)
                | WorkflowError::TaskAlreadyCompleted(_)
                | WorkflowError::StatusInUse(_) => StatusCode::CONFLICT,
                WorkflowError::Storage(e) if is_unique_violation(e) => StatusCode::CONFLICT,
                WorkflowError::Storage(_) | WorkflowError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Get the error type string
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "validation_error",
            ApiError::NotFound { .. } => "not_found",
            ApiError::Internal { .. } => "internal_error",
            ApiError::Workflow(err) => match err {
                WorkflowError::PatientNotFound(_) => "patient_not_found",
                WorkflowError::StatusNotFound(_) => "status_not_found",
                WorkflowError::TransitionNotFound(_) => "transition_not_found",
                WorkflowError::TaskNotFound(_) => "task_not_found",
                WorkflowError::IllegalTransition { .. } => "illegal_transition",
                WorkflowError::OpenTasksRemain { .. } => "open_tasks_remain",
                WorkflowError::ApprovalRequired { .. } => "approval_required",
                WorkflowError::ConcurrentModification(_) => "concurrent_modification",
                WorkflowError::TaskAlreadyCompleted(_) => "task_already_completed",
                WorkflowError::StatusInUse(_) => "status_in_use",
                WorkflowError::Storage(e) if is_unique_violation(e) => "duplicate_resource",
                WorkflowError::Storage(_) => "storage_error",
                WorkflowError::Internal(_) => "internal_error",
            },
        }
    }

    /// Whether this error is an expected business outcome. Expected
    /// outcomes are answered, not logged as faults.
    fn is_expected(&self) -> bool {
        match self {
            ApiError::Validation { .. } | ApiError::NotFound { .. } => true,
            ApiError::Internal { .. } => false,
            ApiError::Workflow(err) => err.is_expected(),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_id = Uuid::new_v4().to_string();
        let status_code = self.status_code();

        if self.is_expected() {
            debug!(
                error_id = %error_id,
                error_type = %self.error_type(),
                status_code = %status_code.as_u16(),
                error = %self,
                "request rejected"
            );
        } else {
            error!(
                error_id = %error_id,
                error_type = %self.error_type(),
                status_code = %status_code.as_u16(),
                error = %self,
                "API error occurred"
            );
        }

        let blocking_task_ids = match &self {
            ApiError::Workflow(WorkflowError::OpenTasksRemain { blocking }) => {
                Some(blocking.clone())
            }
            _ => None,
        };

        let error_response = ApiErrorResponse {
            error_id,
            error_type: self.error_type().to_string(),
            message: self.to_string(),
            blocking_task_ids,
            timestamp: chrono::Utc::now(),
        };

        (status_code, Json(error_response)).into_response()
    }
}

/// Helper function to create successful API responses
pub fn api_success<T>(data: T) -> ApiResponse<T> {
    ApiResponse {
        success: true,
        data,
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_errors_map_to_expected_statuses() {
        let id = Uuid::new_v4();

        let cases = [
            (
                ApiError::from(WorkflowError::PatientNotFound(id)),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(WorkflowError::IllegalTransition { from: id, to: id }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::from(WorkflowError::OpenTasksRemain { blocking: vec![id] }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::from(WorkflowError::ConcurrentModification(id)),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(WorkflowError::TaskAlreadyCompleted(id)),
                StatusCode::CONFLICT,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status_code(), expected, "{}", err.error_type());
        }
    }
}
