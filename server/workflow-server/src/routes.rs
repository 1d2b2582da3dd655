use axum::{
    routing::{delete, get, post, put},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

use crate::handlers::{health, statuses, tasks, websocket, workflow};
use crate::openapi::ApiDoc;
use crate::server::WorkflowServer;

/// All API routes, without middleware or state.
pub fn api_routes() -> Router<WorkflowServer> {
    Router::new()
        .route("/health", get(health::health))
        .route("/api-docs/openapi.json", get(openapi_json))
        // Status catalog
        .route(
            "/api/v1/workflow/statuses",
            get(statuses::list_statuses).post(statuses::create_status),
        )
        .route(
            "/api/v1/workflow/statuses/:status_id",
            put(statuses::update_status).delete(statuses::delete_status),
        )
        .route(
            "/api/v1/workflow/statuses/:status_id/transitions",
            get(statuses::list_transitions),
        )
        .route("/api/v1/workflow/transitions", post(statuses::create_transition))
        .route(
            "/api/v1/workflow/transitions/:transition_id",
            delete(statuses::delete_transition),
        )
        // Patient workflow
        .route("/api/v1/patients/:patient_id/workflow", get(workflow::get_workflow))
        .route(
            "/api/v1/patients/:patient_id/workflow/history",
            get(workflow::get_history),
        )
        .route(
            "/api/v1/patients/:patient_id/workflow/transitions",
            post(workflow::request_transition),
        )
        .route(
            "/api/v1/patients/:patient_id/workflow/ws",
            get(websocket::workflow_ws),
        )
        // Tasks
        .route(
            "/api/v1/patients/:patient_id/tasks",
            get(tasks::list_tasks).post(tasks::create_task),
        )
        .route("/api/v1/tasks/:task_id/complete", post(tasks::complete_task))
        .route("/api/v1/tasks/:task_id", delete(tasks::delete_task))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the application router with middleware and state.
pub fn create_app(server: WorkflowServer) -> Router {
    Router::new()
        .merge(api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(server)
}
