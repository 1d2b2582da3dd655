use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A named clinical workflow stage (e.g. "Intake", "Lab Pending").
///
/// Statuses are reference data maintained by administrators. A status is
/// never deleted while a workflow record, history entry, or task still
/// references it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Status {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Display color for dashboards, e.g. "#2f9e44".
    pub color: Option<String>,
    /// When true, the patient cannot leave this status while open tasks
    /// scoped to it remain.
    pub requires_all_tasks_complete: bool,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewStatus {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub requires_all_tasks_complete: bool,
}

/// Partial update for a status. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateStatus {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub requires_all_tasks_complete: Option<bool>,
}

/// A permitted edge in the status graph.
///
/// A source status with no configured edges is treated as open: any target
/// is reachable from it. Configuring the first edge closes the source
/// status down to its explicit targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct StatusTransition {
    pub id: Uuid,
    pub from_status_id: Uuid,
    pub to_status_id: Uuid,
    /// When true, only actors accepted by the configured approval policy
    /// may perform this transition.
    pub requires_approval: bool,
}

/// Payload for creating a transition edge.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewTransition {
    pub from_status_id: Uuid,
    pub to_status_id: Uuid,
    #[serde(default)]
    pub requires_approval: bool,
}

/// The current workflow state snapshot for one patient.
///
/// `version` is a monotonically increasing counter used for optimistic
/// concurrency; every committed transition increments it by exactly one,
/// so it always equals the number of history entries for the patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WorkflowRecord {
    pub patient_id: Uuid,
    pub current_status_id: Uuid,
    pub previous_status_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub notes: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One immutable audit record of a committed transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub patient_id: Uuid,
    /// `None` for the initial transition out of the virtual "no status"
    /// state.
    pub from_status_id: Option<Uuid>,
    pub to_status_id: Uuid,
    /// The transition edge that was matched, when one was configured.
    pub transition_id: Option<Uuid>,
    pub performed_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Ordering of a patient's history listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOrder {
    /// Most recent transition first. The recommended order for UI
    /// consumption and the HTTP default.
    #[default]
    NewestFirst,
    OldestFirst,
}

/// A checklist item scoped to a patient and a status.
///
/// Tasks persist across transitions; only open tasks whose `status_id`
/// equals the patient's *current* status gate a transition. Completion is
/// one-way through the public API: reopening work means creating a new
/// task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WorkflowTask {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub status_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a task.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewTask {
    pub patient_id: Uuid,
    pub status_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
}

/// Filter for task listings. `None` fields act as wildcards.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
pub struct TaskFilter {
    pub status_id: Option<Uuid>,
    pub completed: Option<bool>,
}

impl TaskFilter {
    /// Open tasks scoped to one status, as consulted by the transition
    /// precondition check.
    pub fn open_for_status(status_id: Uuid) -> Self {
        Self {
            status_id: Some(status_id),
            completed: Some(false),
        }
    }
}

/// A request to move a patient to a new status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransitionRequest {
    pub patient_id: Uuid,
    pub to_status_id: Uuid,
    pub performed_by: Uuid,
    pub notes: Option<String>,
}

/// The committed result of a successful transition: the updated workflow
/// record together with the history entry written in the same atomic unit.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransitionOutcome {
    pub record: WorkflowRecord,
    pub history_entry: HistoryEntry,
}

/// Change event fanned out to workflow observers after a transition
/// commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorkflowEvent {
    pub patient_id: Uuid,
    pub new_status_id: Uuid,
    pub previous_status_id: Option<Uuid>,
    pub history_entry_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

impl WorkflowEvent {
    /// Build the event describing a committed transition.
    pub fn from_outcome(outcome: &TransitionOutcome) -> Self {
        Self {
            patient_id: outcome.record.patient_id,
            new_status_id: outcome.record.current_status_id,
            previous_status_id: outcome.record.previous_status_id,
            history_entry_id: outcome.history_entry.id,
            occurred_at: outcome.history_entry.created_at,
        }
    }
}
