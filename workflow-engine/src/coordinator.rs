//! The transition state machine.
//!
//! `request_transition` either fully commits (record update plus history
//! entry in one atomic unit, then a best-effort change notification) or
//! fails with exactly one typed outcome. There is no partial state and no
//! auto-retry: a concurrent-modification loser re-reads and decides for
//! itself.

use crate::approval::ApprovalPolicy;
use crate::catalog::StatusCatalog;
use crate::error::{Result, WorkflowError};
use crate::models::{
    HistoryEntry, TaskFilter, TransitionOutcome, TransitionRequest, WorkflowEvent, WorkflowRecord,
};
use crate::notifier::WorkflowNotifier;
use crate::store::{CasOutcome, WorkflowStore};
use crate::tasks::TaskBoard;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Validates and applies workflow transitions.
pub struct TransitionCoordinator {
    catalog: Arc<dyn StatusCatalog>,
    store: Arc<dyn WorkflowStore>,
    tasks: Arc<dyn TaskBoard>,
    approvals: Arc<dyn ApprovalPolicy>,
    notifier: WorkflowNotifier,
}

impl TransitionCoordinator {
    pub fn new(
        catalog: Arc<dyn StatusCatalog>,
        store: Arc<dyn WorkflowStore>,
        tasks: Arc<dyn TaskBoard>,
        approvals: Arc<dyn ApprovalPolicy>,
        notifier: WorkflowNotifier,
    ) -> Self {
        Self {
            catalog,
            store,
            tasks,
            approvals,
            notifier,
        }
    }

    /// Move a patient to a new status.
    ///
    /// A patient with no workflow record yet is treated as being in a
    /// virtual "no status" state: the first transition creates the record
    /// at version 1. Concurrency control is per patient through the
    /// record's version; unrelated patients never contend.
    pub async fn request_transition(&self, request: TransitionRequest) -> Result<TransitionOutcome> {
        let TransitionRequest {
            patient_id,
            to_status_id,
            performed_by,
            notes,
        } = request;

        let current = self.store.get(patient_id).await?;

        if let Some(record) = &current {
            let from = record.current_status_id;
            if !self.catalog.is_legal_transition(from, to_status_id).await? {
                debug!(%patient_id, %from, to = %to_status_id, "transition rejected: illegal edge");
                return Err(WorkflowError::IllegalTransition {
                    from,
                    to: to_status_id,
                });
            }
        }

        self.catalog
            .get_status(to_status_id)
            .await?
            .ok_or(WorkflowError::StatusNotFound(to_status_id))?;

        // The gate is on the status being *left*: a status such as
        // "Pending Lab Review" cannot be exited while its checklist is
        // outstanding. The read tolerates staleness; a task completed a
        // moment after it simply lets the next attempt through.
        if let Some(record) = &current {
            let current_status = self
                .catalog
                .get_status(record.current_status_id)
                .await?
                .ok_or(WorkflowError::StatusNotFound(record.current_status_id))?;

            if current_status.requires_all_tasks_complete {
                let open = self
                    .tasks
                    .list_tasks(patient_id, TaskFilter::open_for_status(record.current_status_id))
                    .await?;
                if !open.is_empty() {
                    let blocking: Vec<Uuid> = open.iter().map(|t| t.id).collect();
                    debug!(
                        %patient_id,
                        blocked_by = blocking.len(),
                        "transition rejected: open tasks remain"
                    );
                    return Err(WorkflowError::OpenTasksRemain { blocking });
                }
            }
        }

        let matched = match &current {
            Some(record) => {
                self.catalog
                    .find_transition(record.current_status_id, to_status_id)
                    .await?
            }
            None => None,
        };

        if let Some(transition) = &matched {
            if transition.requires_approval
                && !self.approvals.can_approve(performed_by, transition).await?
            {
                debug!(%patient_id, actor = %performed_by, "transition rejected: approval required");
                return Err(WorkflowError::ApprovalRequired {
                    from: transition.from_status_id,
                    to: transition.to_status_id,
                });
            }
        }

        let now = Utc::now();
        let (expected_version, new_record) = match &current {
            Some(record) => (
                Some(record.version),
                WorkflowRecord {
                    patient_id,
                    current_status_id: to_status_id,
                    previous_status_id: Some(record.current_status_id),
                    assigned_to: record.assigned_to,
                    notes: record.notes.clone(),
                    version: record.version + 1,
                    created_at: record.created_at,
                    updated_at: now,
                },
            ),
            None => (
                None,
                WorkflowRecord {
                    patient_id,
                    current_status_id: to_status_id,
                    previous_status_id: None,
                    assigned_to: None,
                    notes: None,
                    version: 1,
                    created_at: now,
                    updated_at: now,
                },
            ),
        };

        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            patient_id,
            from_status_id: current.as_ref().map(|r| r.current_status_id),
            to_status_id,
            transition_id: matched.as_ref().map(|t| t.id),
            performed_by: Some(performed_by),
            notes,
            created_at: now,
        };

        match self
            .store
            .compare_and_swap(expected_version, &new_record, &entry)
            .await?
        {
            CasOutcome::Committed => {}
            CasOutcome::VersionConflict | CasOutcome::NotFound => {
                debug!(%patient_id, "transition lost optimistic concurrency race");
                return Err(WorkflowError::ConcurrentModification(patient_id));
            }
        }

        info!(
            %patient_id,
            from = ?entry.from_status_id,
            to = %to_status_id,
            version = new_record.version,
            "workflow transition committed"
        );

        let outcome = TransitionOutcome {
            record: new_record,
            history_entry: entry,
        };

        // Best-effort: delivery problems are handled inside the notifier
        // and never roll back a committed transition.
        self.notifier.publish(&WorkflowEvent::from_outcome(&outcome));

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{AllowAllApprovals, DenyAllApprovals};
    use crate::memory::InMemoryWorkflowStore;
    use crate::models::{NewStatus, NewTransition};

    fn coordinator_with(
        backing: Arc<InMemoryWorkflowStore>,
        approvals: Arc<dyn ApprovalPolicy>,
    ) -> TransitionCoordinator {
        TransitionCoordinator::new(
            backing.clone(),
            backing.clone(),
            backing,
            approvals,
            WorkflowNotifier::new(),
        )
    }

    async fn status(backing: &InMemoryWorkflowStore, name: &str) -> Uuid {
        backing
            .create_status(NewStatus {
                name: name.to_string(),
                description: None,
                color: None,
                requires_all_tasks_complete: false,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn closed_graph_rejects_unconfigured_edge() {
        let backing = Arc::new(InMemoryWorkflowStore::new());
        let coordinator = coordinator_with(backing.clone(), Arc::new(AllowAllApprovals));

        let intake = status(&backing, "Intake").await;
        let lab = status(&backing, "Lab Pending").await;
        let diagnosed = status(&backing, "Diagnosed").await;

        // Configuring any edge out of Intake closes its graph.
        backing
            .create_transition(NewTransition {
                from_status_id: intake,
                to_status_id: lab,
                requires_approval: false,
            })
            .await
            .unwrap();

        let patient = Uuid::new_v4();
        let actor = Uuid::new_v4();
        coordinator
            .request_transition(TransitionRequest {
                patient_id: patient,
                to_status_id: intake,
                performed_by: actor,
                notes: None,
            })
            .await
            .unwrap();

        let err = coordinator
            .request_transition(TransitionRequest {
                patient_id: patient,
                to_status_id: diagnosed,
                performed_by: actor,
                notes: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WorkflowError::IllegalTransition { from, to } if from == intake && to == diagnosed
        ));
    }

    #[tokio::test]
    async fn guarded_edge_requires_approval() {
        let backing = Arc::new(InMemoryWorkflowStore::new());
        let coordinator = coordinator_with(backing.clone(), Arc::new(DenyAllApprovals));

        let intake = status(&backing, "Intake").await;
        let discharged = status(&backing, "Discharged").await;
        backing
            .create_transition(NewTransition {
                from_status_id: intake,
                to_status_id: discharged,
                requires_approval: true,
            })
            .await
            .unwrap();

        let patient = Uuid::new_v4();
        let actor = Uuid::new_v4();
        coordinator
            .request_transition(TransitionRequest {
                patient_id: patient,
                to_status_id: intake,
                performed_by: actor,
                notes: None,
            })
            .await
            .unwrap();

        let err = coordinator
            .request_transition(TransitionRequest {
                patient_id: patient,
                to_status_id: discharged,
                performed_by: actor,
                notes: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::ApprovalRequired { .. }));
    }

    #[tokio::test]
    async fn unknown_target_status_is_rejected() {
        let backing = Arc::new(InMemoryWorkflowStore::new());
        let coordinator = coordinator_with(backing, Arc::new(AllowAllApprovals));

        let missing = Uuid::new_v4();
        let err = coordinator
            .request_transition(TransitionRequest {
                patient_id: Uuid::new_v4(),
                to_status_id: missing,
                performed_by: Uuid::new_v4(),
                notes: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::StatusNotFound(id) if id == missing));
    }
}
