use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use workflow_engine::{HistoryEntry, HistoryOrder, TransitionOutcome, TransitionRequest, WorkflowRecord};

use crate::error::{api_success, ApiResponse, ApiResult};
use crate::server::WorkflowServer;

/// Request body for a transition
#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestTransitionBody {
    pub to_status_id: Uuid,
    pub performed_by: Uuid,
    pub notes: Option<String>,
}

/// History listing parameters
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// Listing order; defaults to newest first for UI consumption.
    #[serde(default)]
    pub order: HistoryOrder,
}

/// Get a patient's current workflow record
#[utoipa::path(
    get,
    path = "/api/v1/patients/{patient_id}/workflow",
    params(
        ("patient_id" = Uuid, Path, description = "Patient ID")
    ),
    responses(
        (status = 200, description = "Workflow record retrieved", body = WorkflowRecord),
        (status = 404, description = "No workflow record for this patient"),
        (status = 500, description = "Internal server error")
    ),
    tag = "workflow"
)]
pub async fn get_workflow(
    State(server): State<WorkflowServer>,
    Path(patient_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<WorkflowRecord>>> {
    let record = server.engine.get_workflow(patient_id).await?;
    Ok(Json(api_success(record)))
}

/// List a patient's transition history
#[utoipa::path(
    get,
    path = "/api/v1/patients/{patient_id}/workflow/history",
    params(
        ("patient_id" = Uuid, Path, description = "Patient ID"),
        HistoryParams
    ),
    responses(
        (status = 200, description = "History retrieved", body = Vec<HistoryEntry>),
        (status = 500, description = "Internal server error")
    ),
    tag = "workflow"
)]
pub async fn get_history(
    State(server): State<WorkflowServer>,
    Path(patient_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<ApiResponse<Vec<HistoryEntry>>>> {
    let history = server.engine.get_history(patient_id, params.order).await?;
    Ok(Json(api_success(history)))
}

/// Request a workflow transition for a patient
///
/// Validation and precondition failures come back as typed errors:
/// `illegal_transition`, `open_tasks_remain` (with the blocking task
/// ids), `approval_required`, and `concurrent_modification` for an
/// optimistic-concurrency loss the caller should answer with a re-read
/// and retry.
#[utoipa::path(
    post,
    path = "/api/v1/patients/{patient_id}/workflow/transitions",
    params(
        ("patient_id" = Uuid, Path, description = "Patient ID")
    ),
    request_body = RequestTransitionBody,
    responses(
        (status = 200, description = "Transition committed", body = TransitionOutcome),
        (status = 404, description = "Target status not found"),
        (status = 409, description = "Concurrent modification; re-read and retry"),
        (status = 422, description = "Transition rejected by workflow rules"),
        (status = 500, description = "Internal server error")
    ),
    tag = "workflow"
)]
pub async fn request_transition(
    State(server): State<WorkflowServer>,
    Path(patient_id): Path<Uuid>,
    Json(body): Json<RequestTransitionBody>,
) -> ApiResult<Json<ApiResponse<TransitionOutcome>>> {
    let outcome = server
        .engine
        .request_transition(TransitionRequest {
            patient_id,
            to_status_id: body.to_status_id,
            performed_by: body.performed_by,
            notes: body.notes,
        })
        .await?;

    Ok(Json(api_success(outcome)))
}
