use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("No workflow record exists for patient {0}")]
    PatientNotFound(Uuid),

    #[error("Status not found: {0}")]
    StatusNotFound(Uuid),

    #[error("Transition not found: {0}")]
    TransitionNotFound(Uuid),

    #[error("Transition from {from} to {to} is not permitted")]
    IllegalTransition { from: Uuid, to: Uuid },

    #[error("{} open task(s) must be completed before leaving the current status", blocking.len())]
    OpenTasksRemain { blocking: Vec<Uuid> },

    #[error("Transition from {from} to {to} requires approval")]
    ApprovalRequired { from: Uuid, to: Uuid },

    #[error("Workflow for patient {0} was modified concurrently; re-read and retry")]
    ConcurrentModification(Uuid),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Task {0} is already completed")]
    TaskAlreadyCompleted(Uuid),

    #[error("Status {0} is referenced by existing workflow data")]
    StatusInUse(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Whether this error is an expected business outcome rather than a
    /// fault. Expected outcomes are returned to callers and must not be
    /// logged as errors.
    pub fn is_expected(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Internal(_))
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
