//! End-to-end workflow scenarios over the in-memory backend.
//!
//! Exercises the engine the way a clinic uses it: an intake pipeline
//! with a task-gated lab stage, concurrent actors racing on one patient,
//! and dashboards subscribed to change events.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;
use workflow_engine::{
    CasOutcome, HistoryEntry, HistoryOrder, InMemoryWorkflowStore, NewStatus, NewTask,
    NewTransition, TaskFilter, TransitionCoordinator, TransitionRequest, WorkflowEngine,
    WorkflowError, WorkflowNotifier, WorkflowRecord, WorkflowStore,
};

struct Clinic {
    engine: WorkflowEngine,
    backing: Arc<InMemoryWorkflowStore>,
    intake: Uuid,
    lab_pending: Uuid,
    diagnosed: Uuid,
}

/// Intake -> LabPending -> Diagnosed, with LabPending requiring its
/// checklist to be complete before it can be left.
async fn clinic() -> Clinic {
    let backing = Arc::new(InMemoryWorkflowStore::new());
    let engine = WorkflowEngine::new(backing.clone(), backing.clone(), backing.clone());

    let intake = engine
        .create_status(NewStatus {
            name: "Intake".to_string(),
            description: None,
            color: Some("#4dabf7".to_string()),
            requires_all_tasks_complete: false,
        })
        .await
        .unwrap()
        .id;
    let lab_pending = engine
        .create_status(NewStatus {
            name: "Lab Pending".to_string(),
            description: Some("Waiting on lab work".to_string()),
            color: Some("#fab005".to_string()),
            requires_all_tasks_complete: true,
        })
        .await
        .unwrap()
        .id;
    let diagnosed = engine
        .create_status(NewStatus {
            name: "Diagnosed".to_string(),
            description: None,
            color: Some("#2f9e44".to_string()),
            requires_all_tasks_complete: false,
        })
        .await
        .unwrap()
        .id;

    for (from, to) in [(intake, lab_pending), (lab_pending, diagnosed)] {
        engine
            .create_transition(NewTransition {
                from_status_id: from,
                to_status_id: to,
                requires_approval: false,
            })
            .await
            .unwrap();
    }

    Clinic {
        engine,
        backing,
        intake,
        lab_pending,
        diagnosed,
    }
}

fn transition_to(patient_id: Uuid, to_status_id: Uuid, performed_by: Uuid) -> TransitionRequest {
    TransitionRequest {
        patient_id,
        to_status_id,
        performed_by,
        notes: None,
    }
}

#[tokio::test]
async fn intake_to_diagnosis_with_task_gate() {
    let clinic = clinic().await;
    let patient = Uuid::new_v4();
    let dr_a = Uuid::new_v4();
    let nurse_b = Uuid::new_v4();

    // First transition creates the record at version 1 with a null-origin
    // history entry.
    let outcome = clinic
        .engine
        .request_transition(transition_to(patient, clinic.intake, dr_a))
        .await
        .unwrap();
    assert_eq!(outcome.record.version, 1);
    assert_eq!(outcome.record.previous_status_id, None);
    assert_eq!(outcome.history_entry.from_status_id, None);
    assert_eq!(outcome.history_entry.to_status_id, clinic.intake);

    let task = clinic
        .engine
        .create_task(NewTask {
            patient_id: patient,
            status_id: clinic.lab_pending,
            title: "Draw blood".to_string(),
            description: None,
            due_date: None,
            assigned_to: Some(nurse_b),
        })
        .await
        .unwrap();

    let outcome = clinic
        .engine
        .request_transition(transition_to(patient, clinic.lab_pending, dr_a))
        .await
        .unwrap();
    assert_eq!(outcome.record.version, 2);

    // Lab Pending cannot be left while its checklist is open.
    let err = clinic
        .engine
        .request_transition(transition_to(patient, clinic.diagnosed, dr_a))
        .await
        .unwrap_err();
    match err {
        WorkflowError::OpenTasksRemain { blocking } => assert_eq!(blocking, vec![task.id]),
        other => panic!("expected OpenTasksRemain, got {other:?}"),
    }

    let completed = clinic.engine.complete_task(task.id, nurse_b).await.unwrap();
    assert!(completed.is_completed);
    assert_eq!(completed.completed_by, Some(nurse_b));

    let outcome = clinic
        .engine
        .request_transition(transition_to(patient, clinic.diagnosed, dr_a))
        .await
        .unwrap();
    assert_eq!(outcome.record.version, 3);
    assert_eq!(outcome.record.previous_status_id, Some(clinic.lab_pending));

    let history = clinic
        .engine
        .get_history(patient, HistoryOrder::OldestFirst)
        .await
        .unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(
        history.iter().map(|e| e.to_status_id).collect::<Vec<_>>(),
        vec![clinic.intake, clinic.lab_pending, clinic.diagnosed]
    );
}

#[tokio::test]
async fn history_never_diverges_from_current_state() {
    let clinic = clinic().await;
    let patient = Uuid::new_v4();
    let actor = Uuid::new_v4();

    // Ping-pong across the open part of the graph; Diagnosed has no
    // outgoing edges so every move out of it is legal.
    let stops = [clinic.intake, clinic.lab_pending, clinic.diagnosed, clinic.intake, clinic.lab_pending];
    for (i, stop) in stops.iter().enumerate() {
        let outcome = clinic
            .engine
            .request_transition(transition_to(patient, *stop, actor))
            .await
            .unwrap();
        assert_eq!(outcome.record.version, i as i64 + 1);
    }

    let record = clinic.engine.get_workflow(patient).await.unwrap();
    let history = clinic
        .engine
        .get_history(patient, HistoryOrder::NewestFirst)
        .await
        .unwrap();

    assert_eq!(record.version as usize, history.len());
    assert_eq!(history[0].to_status_id, record.current_status_id);
}

#[tokio::test]
async fn racing_writers_cannot_both_commit() {
    let clinic = clinic().await;
    let patient = Uuid::new_v4();
    let actor = Uuid::new_v4();

    clinic
        .engine
        .request_transition(transition_to(patient, clinic.intake, actor))
        .await
        .unwrap();

    // Two writers snapshot the same version-1 state and race the
    // compare-and-swap directly.
    let store: &InMemoryWorkflowStore = &clinic.backing;
    let snapshot = store.get(patient).await.unwrap().unwrap();

    let contender = |to: Uuid| {
        let now = chrono::Utc::now();
        let record = WorkflowRecord {
            patient_id: patient,
            current_status_id: to,
            previous_status_id: Some(snapshot.current_status_id),
            assigned_to: None,
            notes: None,
            version: snapshot.version + 1,
            created_at: snapshot.created_at,
            updated_at: now,
        };
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            patient_id: patient,
            from_status_id: Some(snapshot.current_status_id),
            to_status_id: to,
            transition_id: None,
            performed_by: Some(actor),
            notes: None,
            created_at: now,
        };
        (record, entry)
    };

    let (record_a, entry_a) = contender(clinic.lab_pending);
    let (record_b, entry_b) = contender(clinic.lab_pending);

    let first = store
        .compare_and_swap(Some(snapshot.version), &record_a, &entry_a)
        .await
        .unwrap();
    let second = store
        .compare_and_swap(Some(snapshot.version), &record_b, &entry_b)
        .await
        .unwrap();

    assert_eq!(first, CasOutcome::Committed);
    assert_eq!(second, CasOutcome::VersionConflict);

    // Exactly one new history entry exists.
    let history = store.history(patient, HistoryOrder::OldestFirst).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(store.get(patient).await.unwrap().unwrap().version, 2);
}

/// Serves one stale read, then defers to the backing store. Reproduces a
/// coordinator whose snapshot went stale between read and commit.
struct StaleReadStore {
    inner: Arc<InMemoryWorkflowStore>,
    stale: Mutex<Option<WorkflowRecord>>,
}

#[async_trait]
impl WorkflowStore for StaleReadStore {
    async fn get(&self, patient_id: Uuid) -> workflow_engine::Result<Option<WorkflowRecord>> {
        if let Some(record) = self.stale.lock().take() {
            return Ok(Some(record));
        }
        self.inner.get(patient_id).await
    }

    async fn history(
        &self,
        patient_id: Uuid,
        order: HistoryOrder,
    ) -> workflow_engine::Result<Vec<HistoryEntry>> {
        self.inner.history(patient_id, order).await
    }

    async fn compare_and_swap(
        &self,
        expected_version: Option<i64>,
        record: &WorkflowRecord,
        entry: &HistoryEntry,
    ) -> workflow_engine::Result<CasOutcome> {
        self.inner.compare_and_swap(expected_version, record, entry).await
    }
}

#[tokio::test]
async fn stale_coordinator_snapshot_surfaces_concurrent_modification() {
    let clinic = clinic().await;
    let patient = Uuid::new_v4();
    let actor = Uuid::new_v4();

    clinic
        .engine
        .request_transition(transition_to(patient, clinic.intake, actor))
        .await
        .unwrap();
    let stale_snapshot = clinic.backing.get(patient).await.unwrap().unwrap();

    // Another actor moves the patient on before our coordinator commits.
    clinic
        .engine
        .request_transition(transition_to(patient, clinic.lab_pending, actor))
        .await
        .unwrap();

    let store = Arc::new(StaleReadStore {
        inner: clinic.backing.clone(),
        stale: Mutex::new(Some(stale_snapshot)),
    });
    let coordinator = TransitionCoordinator::new(
        clinic.backing.clone(),
        store,
        clinic.backing.clone(),
        Arc::new(workflow_engine::AllowAllApprovals),
        WorkflowNotifier::new(),
    );

    let err = coordinator
        .request_transition(transition_to(patient, clinic.lab_pending, actor))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::ConcurrentModification(id) if id == patient));

    // The loser did not write: still exactly two entries.
    let history = clinic
        .backing
        .history(patient, HistoryOrder::OldestFirst)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn completing_a_task_twice_is_rejected() {
    let clinic = clinic().await;
    let patient = Uuid::new_v4();
    let nurse = Uuid::new_v4();

    let task = clinic
        .engine
        .create_task(NewTask {
            patient_id: patient,
            status_id: clinic.intake,
            title: "Verify insurance".to_string(),
            description: None,
            due_date: None,
            assigned_to: None,
        })
        .await
        .unwrap();

    clinic.engine.complete_task(task.id, nurse).await.unwrap();
    let err = clinic.engine.complete_task(task.id, nurse).await.unwrap_err();
    assert!(matches!(err, WorkflowError::TaskAlreadyCompleted(id) if id == task.id));
}

#[tokio::test]
async fn tasks_persist_across_transitions_and_filter() {
    let clinic = clinic().await;
    let patient = Uuid::new_v4();
    let actor = Uuid::new_v4();

    let task = clinic
        .engine
        .create_task(NewTask {
            patient_id: patient,
            status_id: clinic.intake,
            title: "Collect consent form".to_string(),
            description: None,
            due_date: None,
            assigned_to: None,
        })
        .await
        .unwrap();

    clinic
        .engine
        .request_transition(transition_to(patient, clinic.intake, actor))
        .await
        .unwrap();
    clinic
        .engine
        .request_transition(transition_to(patient, clinic.lab_pending, actor))
        .await
        .unwrap();

    // The intake task survives the move and stays scoped to Intake.
    let open_intake = clinic
        .engine
        .list_tasks(patient, TaskFilter::open_for_status(clinic.intake))
        .await
        .unwrap();
    assert_eq!(open_intake.len(), 1);
    assert_eq!(open_intake[0].id, task.id);

    let open_lab = clinic
        .engine
        .list_tasks(patient, TaskFilter::open_for_status(clinic.lab_pending))
        .await
        .unwrap();
    assert!(open_lab.is_empty());

    let all = clinic
        .engine
        .list_tasks(patient, TaskFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn subscriber_sees_exactly_the_committed_transition() {
    let clinic = clinic().await;
    let patient = Uuid::new_v4();
    let actor = Uuid::new_v4();

    let mut updates = clinic.engine.subscribe(patient);
    let dropped = clinic.engine.subscribe(patient);
    clinic.engine.unsubscribe(dropped.into_handle());

    let outcome = clinic
        .engine
        .request_transition(transition_to(patient, clinic.intake, actor))
        .await
        .unwrap();

    let event = updates.recv().await.unwrap();
    assert_eq!(event.patient_id, patient);
    assert_eq!(event.new_status_id, clinic.intake);
    assert_eq!(event.previous_status_id, None);
    assert_eq!(event.history_entry_id, outcome.history_entry.id);

    // Exactly one event per commit.
    assert_eq!(updates.try_recv(), None);
    assert_eq!(clinic.engine.observer_count(patient), 1);
}

#[tokio::test]
async fn unknown_patient_has_no_workflow() {
    let clinic = clinic().await;
    let patient = Uuid::new_v4();

    let err = clinic.engine.get_workflow(patient).await.unwrap_err();
    assert!(matches!(err, WorkflowError::PatientNotFound(id) if id == patient));

    let history = clinic
        .engine
        .get_history(patient, HistoryOrder::NewestFirst)
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn unconfigured_status_leaves_graph_open() {
    let backing = Arc::new(InMemoryWorkflowStore::new());
    let engine = WorkflowEngine::new(backing.clone(), backing.clone(), backing);

    let a = engine
        .create_status(NewStatus {
            name: "Waiting Room".to_string(),
            description: None,
            color: None,
            requires_all_tasks_complete: false,
        })
        .await
        .unwrap()
        .id;
    let b = engine
        .create_status(NewStatus {
            name: "Triaged".to_string(),
            description: None,
            color: None,
            requires_all_tasks_complete: false,
        })
        .await
        .unwrap()
        .id;

    // No edges configured anywhere: every move is legal.
    let patient = Uuid::new_v4();
    let actor = Uuid::new_v4();
    engine
        .request_transition(TransitionRequest {
            patient_id: patient,
            to_status_id: a,
            performed_by: actor,
            notes: None,
        })
        .await
        .unwrap();
    let outcome = engine
        .request_transition(TransitionRequest {
            patient_id: patient,
            to_status_id: b,
            performed_by: actor,
            notes: None,
        })
        .await
        .unwrap();
    assert_eq!(outcome.record.version, 2);
}
