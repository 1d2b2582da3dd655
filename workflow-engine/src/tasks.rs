//! Checklist tasks scoped to a patient and a status.
//!
//! Completion is a single conditional update so two actors racing to
//! complete the same task cannot both succeed; the loser sees
//! [`WorkflowError::TaskAlreadyCompleted`] instead of a silent no-op.

use crate::error::{Result, WorkflowError};
use crate::models::{NewTask, TaskFilter, WorkflowTask};
use crate::store::{pg_error_code, PG_FOREIGN_KEY_VIOLATION};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// Persistence interface for workflow tasks.
#[async_trait]
pub trait TaskBoard: Send + Sync {
    /// List a patient's tasks, optionally narrowed by status and
    /// completion state.
    async fn list_tasks(&self, patient_id: Uuid, filter: TaskFilter) -> Result<Vec<WorkflowTask>>;

    /// Look up a single task.
    async fn get_task(&self, task_id: Uuid) -> Result<Option<WorkflowTask>>;

    /// Create a task against a patient and status pair.
    async fn create_task(&self, task: NewTask) -> Result<WorkflowTask>;

    /// Mark a task completed.
    ///
    /// Completion is one-way: an already-completed task fails with
    /// [`WorkflowError::TaskAlreadyCompleted`] so callers can detect
    /// completion races. Reopening work means creating a new task.
    async fn complete_task(&self, task_id: Uuid, completed_by: Uuid) -> Result<WorkflowTask>;

    /// Delete a task. Supported for correcting mistakes only; completed
    /// tasks normally stay for the audit trail.
    async fn delete_task(&self, task_id: Uuid) -> Result<()>;
}

/// Postgres-backed task board.
pub struct PgTaskBoard {
    pool: PgPool,
}

impl PgTaskBoard {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskBoard for PgTaskBoard {
    async fn list_tasks(&self, patient_id: Uuid, filter: TaskFilter) -> Result<Vec<WorkflowTask>> {
        let tasks = sqlx::query_as::<_, WorkflowTask>(
            r#"
            SELECT * FROM workflow_tasks
            WHERE patient_id = $1
              AND ($2::uuid IS NULL OR status_id = $2)
              AND ($3::boolean IS NULL OR is_completed = $3)
            ORDER BY created_at
            "#,
        )
        .bind(patient_id)
        .bind(filter.status_id)
        .bind(filter.completed)
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<WorkflowTask>> {
        let task = sqlx::query_as::<_, WorkflowTask>(
            "SELECT * FROM workflow_tasks WHERE id = $1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(task)
    }

    async fn create_task(&self, task: NewTask) -> Result<WorkflowTask> {
        let insert = sqlx::query_as::<_, WorkflowTask>(
            r#"
            INSERT INTO workflow_tasks (
                id, patient_id, status_id, title, description,
                due_date, assigned_to, is_completed, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, false, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(task.patient_id)
        .bind(task.status_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.due_date)
        .bind(task.assigned_to)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await;

        let created = match insert {
            Ok(task) => task,
            Err(e) if pg_error_code(&e).as_deref() == Some(PG_FOREIGN_KEY_VIOLATION) => {
                return Err(WorkflowError::StatusNotFound(task.status_id));
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            task_id = %created.id,
            patient_id = %created.patient_id,
            status_id = %created.status_id,
            "workflow task created"
        );
        Ok(created)
    }

    async fn complete_task(&self, task_id: Uuid, completed_by: Uuid) -> Result<WorkflowTask> {
        let completed = sqlx::query_as::<_, WorkflowTask>(
            r#"
            UPDATE workflow_tasks
            SET is_completed = true,
                completed_at = $2,
                completed_by = $3
            WHERE id = $1 AND is_completed = false
            RETURNING *
            "#,
        )
        .bind(task_id)
        .bind(Utc::now())
        .bind(completed_by)
        .fetch_optional(&self.pool)
        .await?;

        match completed {
            Some(task) => {
                info!(task_id = %task_id, completed_by = %completed_by, "workflow task completed");
                Ok(task)
            }
            None => match self.get_task(task_id).await? {
                Some(_) => Err(WorkflowError::TaskAlreadyCompleted(task_id)),
                None => Err(WorkflowError::TaskNotFound(task_id)),
            },
        }
    }

    async fn delete_task(&self, task_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM workflow_tasks WHERE id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::TaskNotFound(task_id));
        }

        info!(task_id = %task_id, "workflow task deleted");
        Ok(())
    }
}
