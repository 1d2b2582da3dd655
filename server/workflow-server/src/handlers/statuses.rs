use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use workflow_engine::{NewStatus, NewTransition, Status, StatusTransition, UpdateStatus};

use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::server::WorkflowServer;

fn validate_status_name(name: &str) -> ApiResult<()> {
    if name.trim().is_empty() {
        return Err(ApiError::validation("Status name is required"));
    }
    if name.len() > 100 {
        return Err(ApiError::validation(
            "Status name must be at most 100 characters",
        ));
    }
    Ok(())
}

/// List all configured statuses
#[utoipa::path(
    get,
    path = "/api/v1/workflow/statuses",
    responses(
        (status = 200, description = "Statuses retrieved", body = Vec<Status>),
        (status = 500, description = "Internal server error")
    ),
    tag = "catalog"
)]
pub async fn list_statuses(
    State(server): State<WorkflowServer>,
) -> ApiResult<Json<ApiResponse<Vec<Status>>>> {
    let statuses = server.engine.list_statuses().await?;
    Ok(Json(api_success(statuses)))
}

/// Create a status
#[utoipa::path(
    post,
    path = "/api/v1/workflow/statuses",
    request_body = NewStatus,
    responses(
        (status = 201, description = "Status created", body = Status),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Status name already exists"),
        (status = 500, description = "Internal server error")
    ),
    tag = "catalog"
)]
pub async fn create_status(
    State(server): State<WorkflowServer>,
    Json(body): Json<NewStatus>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Status>>)> {
    validate_status_name(&body.name)?;
    let status = server.engine.create_status(body).await?;
    Ok((StatusCode::CREATED, Json(api_success(status))))
}

/// Update a status
#[utoipa::path(
    put,
    path = "/api/v1/workflow/statuses/{status_id}",
    params(
        ("status_id" = Uuid, Path, description = "Status ID")
    ),
    request_body = UpdateStatus,
    responses(
        (status = 200, description = "Status updated", body = Status),
        (status = 404, description = "Status not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "catalog"
)]
pub async fn update_status(
    State(server): State<WorkflowServer>,
    Path(status_id): Path<Uuid>,
    Json(body): Json<UpdateStatus>,
) -> ApiResult<Json<ApiResponse<Status>>> {
    if let Some(name) = &body.name {
        validate_status_name(name)?;
    }
    let status = server.engine.update_status(status_id, body).await?;
    Ok(Json(api_success(status)))
}

/// Delete a status
///
/// Rejected with `409 status_in_use` while any workflow record, history
/// entry, or task still references the status, so existing workflows can
/// never point at a deleted status.
#[utoipa::path(
    delete,
    path = "/api/v1/workflow/statuses/{status_id}",
    params(
        ("status_id" = Uuid, Path, description = "Status ID")
    ),
    responses(
        (status = 204, description = "Status deleted"),
        (status = 404, description = "Status not found"),
        (status = 409, description = "Status is referenced by workflow data"),
        (status = 500, description = "Internal server error")
    ),
    tag = "catalog"
)]
pub async fn delete_status(
    State(server): State<WorkflowServer>,
    Path(status_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    server.engine.delete_status(status_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List the outgoing transitions of a status
#[utoipa::path(
    get,
    path = "/api/v1/workflow/statuses/{status_id}/transitions",
    params(
        ("status_id" = Uuid, Path, description = "Source status ID")
    ),
    responses(
        (status = 200, description = "Transitions retrieved", body = Vec<StatusTransition>),
        (status = 500, description = "Internal server error")
    ),
    tag = "catalog"
)]
pub async fn list_transitions(
    State(server): State<WorkflowServer>,
    Path(status_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<StatusTransition>>>> {
    let transitions = server.engine.list_transitions_from(status_id).await?;
    Ok(Json(api_success(transitions)))
}

/// Create a transition edge
#[utoipa::path(
    post,
    path = "/api/v1/workflow/transitions",
    request_body = NewTransition,
    responses(
        (status = 201, description = "Transition created", body = StatusTransition),
        (status = 404, description = "Endpoint status not found"),
        (status = 409, description = "Transition already exists"),
        (status = 500, description = "Internal server error")
    ),
    tag = "catalog"
)]
pub async fn create_transition(
    State(server): State<WorkflowServer>,
    Json(body): Json<NewTransition>,
) -> ApiResult<(StatusCode, Json<ApiResponse<StatusTransition>>)> {
    let transition = server.engine.create_transition(body).await?;
    Ok((StatusCode::CREATED, Json(api_success(transition))))
}

/// Delete a transition edge
#[utoipa::path(
    delete,
    path = "/api/v1/workflow/transitions/{transition_id}",
    params(
        ("transition_id" = Uuid, Path, description = "Transition ID")
    ),
    responses(
        (status = 204, description = "Transition deleted"),
        (status = 404, description = "Transition not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "catalog"
)]
pub async fn delete_transition(
    State(server): State<WorkflowServer>,
    Path(transition_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    server.engine.delete_transition(transition_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
