//! Engine facade bundling the catalog, store, task board, coordinator,
//! and notifier behind the operations external collaborators call.
//!
//! Reads go straight to the stores; only `request_transition` goes
//! through the coordinator's validation and atomic commit path.

use crate::approval::{AllowAllApprovals, ApprovalPolicy};
use crate::catalog::{PgStatusCatalog, StatusCatalog};
use crate::coordinator::TransitionCoordinator;
use crate::error::{Result, WorkflowError};
use crate::memory::InMemoryWorkflowStore;
use crate::models::{
    HistoryEntry, HistoryOrder, NewStatus, NewTask, NewTransition, Status, StatusTransition,
    TaskFilter, TransitionOutcome, TransitionRequest, UpdateStatus, WorkflowRecord, WorkflowTask,
};
use crate::notifier::{SubscriptionHandle, WorkflowNotifier, WorkflowSubscription};
use crate::store::{PgWorkflowStore, WorkflowStore};
use crate::tasks::{PgTaskBoard, TaskBoard};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// The patient workflow engine.
pub struct WorkflowEngine {
    catalog: Arc<dyn StatusCatalog>,
    store: Arc<dyn WorkflowStore>,
    tasks: Arc<dyn TaskBoard>,
    approvals: Arc<dyn ApprovalPolicy>,
    notifier: WorkflowNotifier,
    coordinator: TransitionCoordinator,
}

impl WorkflowEngine {
    /// Create an engine over the given storage backends, with the
    /// permissive default approval policy.
    pub fn new(
        catalog: Arc<dyn StatusCatalog>,
        store: Arc<dyn WorkflowStore>,
        tasks: Arc<dyn TaskBoard>,
    ) -> Self {
        let approvals: Arc<dyn ApprovalPolicy> = Arc::new(AllowAllApprovals);
        let notifier = WorkflowNotifier::new();
        let coordinator = TransitionCoordinator::new(
            catalog.clone(),
            store.clone(),
            tasks.clone(),
            approvals.clone(),
            notifier.clone(),
        );

        Self {
            catalog,
            store,
            tasks,
            approvals,
            notifier,
            coordinator,
        }
    }

    /// Create an engine over a Postgres pool.
    pub fn with_postgres(pool: PgPool) -> Self {
        Self::new(
            Arc::new(PgStatusCatalog::new(pool.clone())),
            Arc::new(PgWorkflowStore::new(pool.clone())),
            Arc::new(PgTaskBoard::new(pool)),
        )
    }

    /// Create an engine over the in-memory backend, for development and
    /// tests.
    pub fn in_memory() -> Self {
        let backing = Arc::new(InMemoryWorkflowStore::new());
        Self::new(backing.clone(), backing.clone(), backing)
    }

    /// Replace the approval policy.
    pub fn with_approval_policy(mut self, approvals: Arc<dyn ApprovalPolicy>) -> Self {
        self.approvals = approvals;
        self.rebuild_coordinator();
        self
    }

    /// Replace the notifier's per-observer buffer capacity.
    pub fn with_observer_capacity(mut self, capacity: usize) -> Self {
        self.notifier = WorkflowNotifier::with_capacity(capacity);
        self.rebuild_coordinator();
        self
    }

    fn rebuild_coordinator(&mut self) {
        self.coordinator = TransitionCoordinator::new(
            self.catalog.clone(),
            self.store.clone(),
            self.tasks.clone(),
            self.approvals.clone(),
            self.notifier.clone(),
        );
    }

    // =========================================================================
    // Workflow state
    // =========================================================================

    /// Fetch a patient's current workflow record.
    pub async fn get_workflow(&self, patient_id: Uuid) -> Result<WorkflowRecord> {
        self.store
            .get(patient_id)
            .await?
            .ok_or(WorkflowError::PatientNotFound(patient_id))
    }

    /// List a patient's transition history. Empty when no transition has
    /// ever been committed.
    pub async fn get_history(
        &self,
        patient_id: Uuid,
        order: HistoryOrder,
    ) -> Result<Vec<HistoryEntry>> {
        self.store.history(patient_id, order).await
    }

    /// Move a patient to a new status. See
    /// [`TransitionCoordinator::request_transition`].
    pub async fn request_transition(
        &self,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome> {
        self.coordinator.request_transition(request).await
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    pub async fn list_tasks(
        &self,
        patient_id: Uuid,
        filter: TaskFilter,
    ) -> Result<Vec<WorkflowTask>> {
        self.tasks.list_tasks(patient_id, filter).await
    }

    pub async fn create_task(&self, task: NewTask) -> Result<WorkflowTask> {
        self.tasks.create_task(task).await
    }

    pub async fn complete_task(&self, task_id: Uuid, completed_by: Uuid) -> Result<WorkflowTask> {
        self.tasks.complete_task(task_id, completed_by).await
    }

    pub async fn delete_task(&self, task_id: Uuid) -> Result<()> {
        self.tasks.delete_task(task_id).await
    }

    // =========================================================================
    // Status catalog
    // =========================================================================

    pub async fn list_statuses(&self) -> Result<Vec<Status>> {
        self.catalog.list_statuses().await
    }

    pub async fn get_status(&self, status_id: Uuid) -> Result<Option<Status>> {
        self.catalog.get_status(status_id).await
    }

    pub async fn list_transitions_from(
        &self,
        from_status_id: Uuid,
    ) -> Result<Vec<StatusTransition>> {
        self.catalog.transitions_from(from_status_id).await
    }

    pub async fn create_status(&self, status: NewStatus) -> Result<Status> {
        self.catalog.create_status(status).await
    }

    pub async fn update_status(&self, status_id: Uuid, changes: UpdateStatus) -> Result<Status> {
        self.catalog.update_status(status_id, changes).await
    }

    pub async fn delete_status(&self, status_id: Uuid) -> Result<()> {
        self.catalog.delete_status(status_id).await
    }

    pub async fn create_transition(&self, transition: NewTransition) -> Result<StatusTransition> {
        self.catalog.create_transition(transition).await
    }

    pub async fn delete_transition(&self, transition_id: Uuid) -> Result<()> {
        self.catalog.delete_transition(transition_id).await
    }

    // =========================================================================
    // Change notification
    // =========================================================================

    /// Subscribe to a patient's workflow changes.
    pub fn subscribe(&self, patient_id: Uuid) -> WorkflowSubscription {
        self.notifier.subscribe(patient_id)
    }

    /// Release an observer slot explicitly.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.notifier.unsubscribe(handle);
    }

    /// Number of live observers for a patient.
    pub fn observer_count(&self, patient_id: Uuid) -> usize {
        self.notifier.observer_count(patient_id)
    }
}
