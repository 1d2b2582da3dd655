use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use workflow_engine::{NewTask, TaskFilter, WorkflowTask};

use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::server::WorkflowServer;

/// Request body for creating a task
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    pub status_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
}

/// Request body for completing a task
#[derive(Debug, Deserialize, ToSchema)]
pub struct CompleteTaskRequest {
    pub completed_by: Uuid,
}

/// Task listing parameters
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskListParams {
    pub status_id: Option<Uuid>,
    pub completed: Option<bool>,
}

/// List a patient's tasks
#[utoipa::path(
    get,
    path = "/api/v1/patients/{patient_id}/tasks",
    params(
        ("patient_id" = Uuid, Path, description = "Patient ID"),
        TaskListParams
    ),
    responses(
        (status = 200, description = "Tasks retrieved", body = Vec<WorkflowTask>),
        (status = 500, description = "Internal server error")
    ),
    tag = "tasks"
)]
pub async fn list_tasks(
    State(server): State<WorkflowServer>,
    Path(patient_id): Path<Uuid>,
    Query(params): Query<TaskListParams>,
) -> ApiResult<Json<ApiResponse<Vec<WorkflowTask>>>> {
    let tasks = server
        .engine
        .list_tasks(
            patient_id,
            TaskFilter {
                status_id: params.status_id,
                completed: params.completed,
            },
        )
        .await?;

    Ok(Json(api_success(tasks)))
}

/// Create a task for a patient and status
#[utoipa::path(
    post,
    path = "/api/v1/patients/{patient_id}/tasks",
    params(
        ("patient_id" = Uuid, Path, description = "Patient ID")
    ),
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = WorkflowTask),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Status not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "tasks"
)]
pub async fn create_task(
    State(server): State<WorkflowServer>,
    Path(patient_id): Path<Uuid>,
    Json(body): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<WorkflowTask>>)> {
    if body.title.trim().is_empty() {
        return Err(ApiError::validation("Task title is required"));
    }
    if body.title.len() > 200 {
        return Err(ApiError::validation(
            "Task title must be at most 200 characters",
        ));
    }

    let task = server
        .engine
        .create_task(NewTask {
            patient_id,
            status_id: body.status_id,
            title: body.title,
            description: body.description,
            due_date: body.due_date,
            assigned_to: body.assigned_to,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(api_success(task))))
}

/// Complete a task
///
/// Completion is one-way: completing an already-completed task answers
/// `409 task_already_completed` so racing actors can detect each other.
#[utoipa::path(
    post,
    path = "/api/v1/tasks/{task_id}/complete",
    params(
        ("task_id" = Uuid, Path, description = "Task ID")
    ),
    request_body = CompleteTaskRequest,
    responses(
        (status = 200, description = "Task completed", body = WorkflowTask),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Task already completed"),
        (status = 500, description = "Internal server error")
    ),
    tag = "tasks"
)]
pub async fn complete_task(
    State(server): State<WorkflowServer>,
    Path(task_id): Path<Uuid>,
    Json(body): Json<CompleteTaskRequest>,
) -> ApiResult<Json<ApiResponse<WorkflowTask>>> {
    let task = server.engine.complete_task(task_id, body.completed_by).await?;
    Ok(Json(api_success(task)))
}

/// Delete a task
#[utoipa::path(
    delete,
    path = "/api/v1/tasks/{task_id}",
    params(
        ("task_id" = Uuid, Path, description = "Task ID")
    ),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 404, description = "Task not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "tasks"
)]
pub async fn delete_task(
    State(server): State<WorkflowServer>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    server.engine.delete_task(task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
