//! Patient workflow state machine engine for CareFlow.
//!
//! This crate tracks a patient's clinical processing state as a finite
//! set of named statuses and provides:
//! - A configurable status catalog with a directed transition graph
//!   (open by default for unconfigured statuses)
//! - Per-patient optimistic concurrency: a version counter plus a
//!   compare-and-swap write path, no global lock
//! - An append-only transition history committed atomically with every
//!   state change, so audit and current state never diverge
//! - Status-scoped checklist tasks that can gate leaving a status
//! - Injectable approval gating for guarded transitions
//! - Real-time change fan-out over bounded per-observer channels
//!
//! # Example
//!
//! ```rust
//! use uuid::Uuid;
//! use workflow_engine::{NewStatus, TransitionRequest, WorkflowEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = WorkflowEngine::in_memory();
//!
//!     let intake = engine
//!         .create_status(NewStatus {
//!             name: "Intake".to_string(),
//!             description: None,
//!             color: None,
//!             requires_all_tasks_complete: false,
//!         })
//!         .await?;
//!
//!     let patient = Uuid::new_v4();
//!     let mut updates = engine.subscribe(patient);
//!
//!     let outcome = engine
//!         .request_transition(TransitionRequest {
//!             patient_id: patient,
//!             to_status_id: intake.id,
//!             performed_by: Uuid::new_v4(),
//!             notes: Some("admitted via ER".to_string()),
//!         })
//!         .await?;
//!     assert_eq!(outcome.record.version, 1);
//!
//!     let event = updates.recv().await.ok_or("subscription closed")?;
//!     assert_eq!(event.new_status_id, intake.id);
//!
//!     Ok(())
//! }
//! ```

pub mod approval;
pub mod catalog;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod memory;
pub mod models;
pub mod notifier;
pub mod store;
pub mod tasks;

pub use approval::*;
pub use catalog::*;
pub use coordinator::*;
pub use engine::*;
pub use error::*;
pub use memory::*;
pub use models::*;
pub use notifier::*;
pub use store::*;
pub use tasks::*;
