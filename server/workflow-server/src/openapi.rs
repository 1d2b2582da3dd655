use utoipa::OpenApi;

use crate::handlers::health::HealthResponse;
use crate::handlers::tasks::{CompleteTaskRequest, CreateTaskRequest};
use crate::handlers::workflow::RequestTransitionBody;
use workflow_engine::{
    HistoryEntry, HistoryOrder, NewStatus, NewTransition, Status, StatusTransition,
    TransitionOutcome, UpdateStatus, WorkflowEvent, WorkflowRecord, WorkflowTask,
};

/// OpenAPI document for the workflow server.
///
/// `WorkflowEvent` has no HTTP path of its own: it is the frame payload
/// of the per-patient WebSocket channel.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health,
        crate::handlers::workflow::get_workflow,
        crate::handlers::workflow::get_history,
        crate::handlers::workflow::request_transition,
        crate::handlers::tasks::list_tasks,
        crate::handlers::tasks::create_task,
        crate::handlers::tasks::complete_task,
        crate::handlers::tasks::delete_task,
        crate::handlers::statuses::list_statuses,
        crate::handlers::statuses::create_status,
        crate::handlers::statuses::update_status,
        crate::handlers::statuses::delete_status,
        crate::handlers::statuses::list_transitions,
        crate::handlers::statuses::create_transition,
        crate::handlers::statuses::delete_transition,
    ),
    components(schemas(
        Status,
        NewStatus,
        UpdateStatus,
        StatusTransition,
        NewTransition,
        WorkflowRecord,
        HistoryEntry,
        HistoryOrder,
        WorkflowTask,
        TransitionOutcome,
        WorkflowEvent,
        RequestTransitionBody,
        CreateTaskRequest,
        CompleteTaskRequest,
        HealthResponse,
    )),
    tags(
        (name = "workflow", description = "Patient workflow state and transitions"),
        (name = "tasks", description = "Status-scoped checklist tasks"),
        (name = "catalog", description = "Status catalog administration"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;
