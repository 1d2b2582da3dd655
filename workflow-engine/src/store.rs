//! Workflow record and history persistence.
//!
//! The compare-and-swap is the sole write path for workflow state: the
//! record update and the history append commit in one atomic unit, keyed
//! on the record's `version`. Two callers racing to transition the same
//! patient can therefore never both succeed from stale state, and readers
//! never observe a history entry without the record already reflecting it.

use crate::error::{Result, WorkflowError};
use crate::models::{HistoryEntry, HistoryOrder, WorkflowRecord};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

/// Outcome of a conditional workflow write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The record and its history entry were committed.
    Committed,
    /// The record's version no longer matches the caller's expectation
    /// (or, for a first transition, another caller created the record
    /// first). The caller must re-read and retry.
    VersionConflict,
    /// The caller expected an existing record but none was found.
    NotFound,
}

/// Persistence interface for workflow records and their append-only
/// transition history.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Fetch the workflow record for a patient, if any transition has
    /// ever been committed for them.
    async fn get(&self, patient_id: Uuid) -> Result<Option<WorkflowRecord>>;

    /// List the transition history for a patient in the requested order.
    async fn history(&self, patient_id: Uuid, order: HistoryOrder) -> Result<Vec<HistoryEntry>>;

    /// Atomically persist `record` and append `entry`, conditional on the
    /// stored version still matching `expected_version`.
    ///
    /// `None` means "no record may exist yet" (the patient's first
    /// transition); `Some(v)` is a conditional update keyed on `v`. All
    /// other components mutate workflow state exclusively through the
    /// transition coordinator, which calls this.
    async fn compare_and_swap(
        &self,
        expected_version: Option<i64>,
        record: &WorkflowRecord,
        entry: &HistoryEntry,
    ) -> Result<CasOutcome>;
}

/// Extract the Postgres error code from a sqlx error, when present.
pub(crate) fn pg_error_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Foreign key violation, raised when a referenced row does not exist.
pub(crate) const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

/// Postgres-backed workflow store.
pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn get(&self, patient_id: Uuid) -> Result<Option<WorkflowRecord>> {
        let record = sqlx::query_as::<_, WorkflowRecord>(
            "SELECT * FROM patient_workflow WHERE patient_id = $1",
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn history(&self, patient_id: Uuid, order: HistoryOrder) -> Result<Vec<HistoryEntry>> {
        let sql = match order {
            HistoryOrder::NewestFirst => {
                "SELECT * FROM workflow_history WHERE patient_id = $1 ORDER BY created_at DESC, id DESC"
            }
            HistoryOrder::OldestFirst => {
                "SELECT * FROM workflow_history WHERE patient_id = $1 ORDER BY created_at ASC, id ASC"
            }
        };

        let entries = sqlx::query_as::<_, HistoryEntry>(sql)
            .bind(patient_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    async fn compare_and_swap(
        &self,
        expected_version: Option<i64>,
        record: &WorkflowRecord,
        entry: &HistoryEntry,
    ) -> Result<CasOutcome> {
        let mut tx = self.pool.begin().await?;

        let result = match expected_version {
            None => {
                let insert = sqlx::query(
                    r#"
                    INSERT INTO patient_workflow (
                        patient_id, current_status_id, previous_status_id,
                        assigned_to, notes, version, created_at, updated_at
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    ON CONFLICT (patient_id) DO NOTHING
                    "#,
                )
                .bind(record.patient_id)
                .bind(record.current_status_id)
                .bind(record.previous_status_id)
                .bind(record.assigned_to)
                .bind(&record.notes)
                .bind(record.version)
                .bind(record.created_at)
                .bind(record.updated_at)
                .execute(&mut *tx)
                .await;

                match insert {
                    Ok(result) => result,
                    Err(e) if pg_error_code(&e).as_deref() == Some(PG_FOREIGN_KEY_VIOLATION) => {
                        // The host schema may constrain patient_id to its
                        // own patient table.
                        return Err(WorkflowError::PatientNotFound(record.patient_id));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Some(version) => {
                sqlx::query(
                    r#"
                    UPDATE patient_workflow
                    SET current_status_id = $2,
                        previous_status_id = $3,
                        assigned_to = $4,
                        notes = $5,
                        version = $6,
                        updated_at = $7
                    WHERE patient_id = $1 AND version = $8
                    "#,
                )
                .bind(record.patient_id)
                .bind(record.current_status_id)
                .bind(record.previous_status_id)
                .bind(record.assigned_to)
                .bind(&record.notes)
                .bind(record.version)
                .bind(record.updated_at)
                .bind(version)
                .execute(&mut *tx)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            tx.rollback().await?;

            let outcome = match expected_version {
                None => CasOutcome::VersionConflict,
                Some(_) => {
                    let exists = sqlx::query_scalar::<_, bool>(
                        "SELECT EXISTS(SELECT 1 FROM patient_workflow WHERE patient_id = $1)",
                    )
                    .bind(record.patient_id)
                    .fetch_one(&self.pool)
                    .await?;

                    if exists {
                        CasOutcome::VersionConflict
                    } else {
                        CasOutcome::NotFound
                    }
                }
            };

            debug!(
                patient_id = %record.patient_id,
                ?expected_version,
                ?outcome,
                "workflow compare-and-swap rejected"
            );
            return Ok(outcome);
        }

        sqlx::query(
            r#"
            INSERT INTO workflow_history (
                id, patient_id, from_status_id, to_status_id,
                transition_id, performed_by, notes, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.patient_id)
        .bind(entry.from_status_id)
        .bind(entry.to_status_id)
        .bind(entry.transition_id)
        .bind(entry.performed_by)
        .bind(entry.notes.as_deref())
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            patient_id = %record.patient_id,
            version = record.version,
            "workflow compare-and-swap committed"
        );
        Ok(CasOutcome::Committed)
    }
}
