//! CareFlow workflow engine HTTP server.
//!
//! Exposes the patient workflow engine to dashboards and CRUD layers:
//! a JSON API for workflow state, history, transitions, tasks, and the
//! status catalog, plus a per-patient WebSocket channel for real-time
//! change delivery.

pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod server;

pub use routes::create_app;
pub use server::WorkflowServer;
