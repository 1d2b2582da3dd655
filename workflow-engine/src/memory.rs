//! In-memory workflow storage for testing and development.
//!
//! One [`InMemoryWorkflowStore`] implements all three storage interfaces
//! over a single lock, which makes the compare-and-swap and the status
//! deletion guard trivially atomic. The lock is never held across an
//! await point.

use crate::catalog::StatusCatalog;
use crate::error::{Result, WorkflowError};
use crate::models::{
    HistoryEntry, HistoryOrder, NewStatus, NewTask, NewTransition, Status, StatusTransition,
    TaskFilter, UpdateStatus, WorkflowRecord, WorkflowTask,
};
use crate::store::{CasOutcome, WorkflowStore};
use crate::tasks::TaskBoard;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct WorkflowState {
    statuses: HashMap<Uuid, Status>,
    transitions: HashMap<Uuid, StatusTransition>,
    records: HashMap<Uuid, WorkflowRecord>,
    history: HashMap<Uuid, Vec<HistoryEntry>>,
    tasks: HashMap<Uuid, WorkflowTask>,
}

/// In-memory implementation of the catalog, store, and task board.
#[derive(Clone, Default)]
pub struct InMemoryWorkflowStore {
    state: Arc<RwLock<WorkflowState>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusCatalog for InMemoryWorkflowStore {
    async fn list_statuses(&self) -> Result<Vec<Status>> {
        let state = self.state.read();
        let mut statuses: Vec<Status> = state.statuses.values().cloned().collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(statuses)
    }

    async fn get_status(&self, status_id: Uuid) -> Result<Option<Status>> {
        Ok(self.state.read().statuses.get(&status_id).cloned())
    }

    async fn transitions_from(&self, from_status_id: Uuid) -> Result<Vec<StatusTransition>> {
        let state = self.state.read();
        Ok(state
            .transitions
            .values()
            .filter(|t| t.from_status_id == from_status_id)
            .cloned()
            .collect())
    }

    async fn find_transition(
        &self,
        from_status_id: Uuid,
        to_status_id: Uuid,
    ) -> Result<Option<StatusTransition>> {
        let state = self.state.read();
        Ok(state
            .transitions
            .values()
            .find(|t| t.from_status_id == from_status_id && t.to_status_id == to_status_id)
            .cloned())
    }

    async fn create_status(&self, status: NewStatus) -> Result<Status> {
        let created = Status {
            id: Uuid::new_v4(),
            name: status.name,
            description: status.description,
            color: status.color,
            requires_all_tasks_complete: status.requires_all_tasks_complete,
            created_at: Utc::now(),
        };
        self.state.write().statuses.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_status(&self, status_id: Uuid, changes: UpdateStatus) -> Result<Status> {
        let mut state = self.state.write();
        let status = state
            .statuses
            .get_mut(&status_id)
            .ok_or(WorkflowError::StatusNotFound(status_id))?;

        if let Some(name) = changes.name {
            status.name = name;
        }
        if let Some(description) = changes.description {
            status.description = Some(description);
        }
        if let Some(color) = changes.color {
            status.color = Some(color);
        }
        if let Some(required) = changes.requires_all_tasks_complete {
            status.requires_all_tasks_complete = required;
        }

        Ok(status.clone())
    }

    async fn delete_status(&self, status_id: Uuid) -> Result<()> {
        let mut state = self.state.write();
        if !state.statuses.contains_key(&status_id) {
            return Err(WorkflowError::StatusNotFound(status_id));
        }

        let referenced = state.records.values().any(|r| {
            r.current_status_id == status_id || r.previous_status_id == Some(status_id)
        }) || state.history.values().flatten().any(|e| {
            e.to_status_id == status_id || e.from_status_id == Some(status_id)
        }) || state.tasks.values().any(|t| t.status_id == status_id);

        if referenced {
            return Err(WorkflowError::StatusInUse(status_id));
        }

        state.statuses.remove(&status_id);
        Ok(())
    }

    async fn create_transition(&self, transition: NewTransition) -> Result<StatusTransition> {
        let mut state = self.state.write();
        for endpoint in [transition.from_status_id, transition.to_status_id] {
            if !state.statuses.contains_key(&endpoint) {
                return Err(WorkflowError::StatusNotFound(endpoint));
            }
        }

        let created = StatusTransition {
            id: Uuid::new_v4(),
            from_status_id: transition.from_status_id,
            to_status_id: transition.to_status_id,
            requires_approval: transition.requires_approval,
        };
        state.transitions.insert(created.id, created.clone());
        Ok(created)
    }

    async fn delete_transition(&self, transition_id: Uuid) -> Result<()> {
        let mut state = self.state.write();
        state
            .transitions
            .remove(&transition_id)
            .ok_or(WorkflowError::TransitionNotFound(transition_id))?;
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn get(&self, patient_id: Uuid) -> Result<Option<WorkflowRecord>> {
        Ok(self.state.read().records.get(&patient_id).cloned())
    }

    async fn history(&self, patient_id: Uuid, order: HistoryOrder) -> Result<Vec<HistoryEntry>> {
        let state = self.state.read();
        let mut entries = state.history.get(&patient_id).cloned().unwrap_or_default();
        if order == HistoryOrder::NewestFirst {
            entries.reverse();
        }
        Ok(entries)
    }

    async fn compare_and_swap(
        &self,
        expected_version: Option<i64>,
        record: &WorkflowRecord,
        entry: &HistoryEntry,
    ) -> Result<CasOutcome> {
        let mut state = self.state.write();

        match (expected_version, state.records.get(&record.patient_id)) {
            (None, Some(_)) => return Ok(CasOutcome::VersionConflict),
            (Some(_), None) => return Ok(CasOutcome::NotFound),
            (Some(expected), Some(existing)) if existing.version != expected => {
                return Ok(CasOutcome::VersionConflict);
            }
            _ => {}
        }

        state.records.insert(record.patient_id, record.clone());
        state
            .history
            .entry(record.patient_id)
            .or_default()
            .push(entry.clone());

        Ok(CasOutcome::Committed)
    }
}

#[async_trait]
impl TaskBoard for InMemoryWorkflowStore {
    async fn list_tasks(&self, patient_id: Uuid, filter: TaskFilter) -> Result<Vec<WorkflowTask>> {
        let state = self.state.read();
        let mut tasks: Vec<WorkflowTask> = state
            .tasks
            .values()
            .filter(|t| t.patient_id == patient_id)
            .filter(|t| filter.status_id.map_or(true, |s| t.status_id == s))
            .filter(|t| filter.completed.map_or(true, |c| t.is_completed == c))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<WorkflowTask>> {
        Ok(self.state.read().tasks.get(&task_id).cloned())
    }

    async fn create_task(&self, task: NewTask) -> Result<WorkflowTask> {
        let mut state = self.state.write();
        if !state.statuses.contains_key(&task.status_id) {
            return Err(WorkflowError::StatusNotFound(task.status_id));
        }

        let created = WorkflowTask {
            id: Uuid::new_v4(),
            patient_id: task.patient_id,
            status_id: task.status_id,
            title: task.title,
            description: task.description,
            due_date: task.due_date,
            assigned_to: task.assigned_to,
            is_completed: false,
            completed_at: None,
            completed_by: None,
            created_at: Utc::now(),
        };
        state.tasks.insert(created.id, created.clone());
        Ok(created)
    }

    async fn complete_task(&self, task_id: Uuid, completed_by: Uuid) -> Result<WorkflowTask> {
        let mut state = self.state.write();
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or(WorkflowError::TaskNotFound(task_id))?;

        if task.is_completed {
            return Err(WorkflowError::TaskAlreadyCompleted(task_id));
        }

        task.is_completed = true;
        task.completed_at = Some(Utc::now());
        task.completed_by = Some(completed_by);
        Ok(task.clone())
    }

    async fn delete_task(&self, task_id: Uuid) -> Result<()> {
        self.state
            .write()
            .tasks
            .remove(&task_id)
            .ok_or(WorkflowError::TaskNotFound(task_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn compare_and_swap_rejects_stale_version() {
        let store = InMemoryWorkflowStore::new();
        let patient = Uuid::new_v4();
        let status = Uuid::new_v4();
        let now = Utc::now();

        let record = WorkflowRecord {
            patient_id: patient,
            current_status_id: status,
            previous_status_id: None,
            assigned_to: None,
            notes: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            patient_id: patient,
            from_status_id: None,
            to_status_id: status,
            transition_id: None,
            performed_by: None,
            notes: None,
            created_at: now,
        };

        let outcome = store.compare_and_swap(None, &record, &entry).await.unwrap();
        assert_eq!(outcome, CasOutcome::Committed);

        // A second first-transition write loses the race.
        let outcome = store.compare_and_swap(None, &record, &entry).await.unwrap();
        assert_eq!(outcome, CasOutcome::VersionConflict);

        // An update keyed on the wrong version loses too.
        let outcome = store.compare_and_swap(Some(7), &record, &entry).await.unwrap();
        assert_eq!(outcome, CasOutcome::VersionConflict);

        let stored = store.get(patient).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(store.history(patient, HistoryOrder::OldestFirst).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_status_guards_references() {
        let store = InMemoryWorkflowStore::new();
        let status = store
            .create_status(NewStatus {
                name: "Intake".to_string(),
                description: None,
                color: None,
                requires_all_tasks_complete: false,
            })
            .await
            .unwrap();

        store
            .create_task(NewTask {
                patient_id: Uuid::new_v4(),
                status_id: status.id,
                title: "Collect consent form".to_string(),
                description: None,
                due_date: None,
                assigned_to: None,
            })
            .await
            .unwrap();

        let err = store.delete_status(status.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StatusInUse(id) if id == status.id));
    }
}
