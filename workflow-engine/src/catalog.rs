//! Status catalog: the immutable set of valid statuses and the directed
//! transition graph between them.
//!
//! The catalog is read-only on the engine's hot path. Administrative
//! mutations are exposed for configuration tooling and guard referential
//! integrity: a status cannot be deleted while any workflow record,
//! history entry, or task still points at it.

use crate::error::{Result, WorkflowError};
use crate::models::{NewStatus, NewTransition, Status, StatusTransition, UpdateStatus};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// Catalog interface for statuses and transition edges.
#[async_trait]
pub trait StatusCatalog: Send + Sync {
    /// List all configured statuses.
    async fn list_statuses(&self) -> Result<Vec<Status>>;

    /// Look up a single status.
    async fn get_status(&self, status_id: Uuid) -> Result<Option<Status>>;

    /// List the outgoing edges configured for a source status.
    async fn transitions_from(&self, from_status_id: Uuid) -> Result<Vec<StatusTransition>>;

    /// Find the edge between two statuses, when one is configured.
    async fn find_transition(
        &self,
        from_status_id: Uuid,
        to_status_id: Uuid,
    ) -> Result<Option<StatusTransition>>;

    /// Whether moving from `from_status_id` to `to_status_id` is legal.
    ///
    /// A move is legal when an explicit edge exists, or when the source
    /// status has no configured edges at all (open-graph default, so an
    /// unconfigured workflow is never hard-locked).
    async fn is_legal_transition(&self, from_status_id: Uuid, to_status_id: Uuid) -> Result<bool> {
        let outgoing = self.transitions_from(from_status_id).await?;
        if outgoing.is_empty() {
            return Ok(true);
        }
        Ok(outgoing.iter().any(|t| t.to_status_id == to_status_id))
    }

    /// Create a status.
    async fn create_status(&self, status: NewStatus) -> Result<Status>;

    /// Apply a partial update to a status.
    async fn update_status(&self, status_id: Uuid, changes: UpdateStatus) -> Result<Status>;

    /// Delete a status.
    ///
    /// Fails with [`WorkflowError::StatusInUse`] while any workflow
    /// record, history entry, or task references the status.
    async fn delete_status(&self, status_id: Uuid) -> Result<()>;

    /// Create a transition edge. Both endpoints must exist.
    async fn create_transition(&self, transition: NewTransition) -> Result<StatusTransition>;

    /// Delete a transition edge. History entries keep their audit trail;
    /// only the graph changes.
    async fn delete_transition(&self, transition_id: Uuid) -> Result<()>;
}

/// Postgres-backed status catalog.
pub struct PgStatusCatalog {
    pool: PgPool,
}

impl PgStatusCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusCatalog for PgStatusCatalog {
    async fn list_statuses(&self) -> Result<Vec<Status>> {
        let statuses = sqlx::query_as::<_, Status>(
            "SELECT * FROM workflow_status ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(statuses)
    }

    async fn get_status(&self, status_id: Uuid) -> Result<Option<Status>> {
        let status = sqlx::query_as::<_, Status>(
            "SELECT * FROM workflow_status WHERE id = $1",
        )
        .bind(status_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(status)
    }

    async fn transitions_from(&self, from_status_id: Uuid) -> Result<Vec<StatusTransition>> {
        let transitions = sqlx::query_as::<_, StatusTransition>(
            "SELECT * FROM workflow_transitions WHERE from_status_id = $1",
        )
        .bind(from_status_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transitions)
    }

    async fn find_transition(
        &self,
        from_status_id: Uuid,
        to_status_id: Uuid,
    ) -> Result<Option<StatusTransition>> {
        let transition = sqlx::query_as::<_, StatusTransition>(
            "SELECT * FROM workflow_transitions WHERE from_status_id = $1 AND to_status_id = $2",
        )
        .bind(from_status_id)
        .bind(to_status_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transition)
    }

    async fn create_status(&self, status: NewStatus) -> Result<Status> {
        let created = sqlx::query_as::<_, Status>(
            r#"
            INSERT INTO workflow_status (id, name, description, color, requires_all_tasks_complete, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&status.name)
        .bind(&status.description)
        .bind(&status.color)
        .bind(status.requires_all_tasks_complete)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        info!(status_id = %created.id, name = %created.name, "workflow status created");
        Ok(created)
    }

    async fn update_status(&self, status_id: Uuid, changes: UpdateStatus) -> Result<Status> {
        let updated = sqlx::query_as::<_, Status>(
            r#"
            UPDATE workflow_status
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                color = COALESCE($4, color),
                requires_all_tasks_complete = COALESCE($5, requires_all_tasks_complete)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(status_id)
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(&changes.color)
        .bind(changes.requires_all_tasks_complete)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(WorkflowError::StatusNotFound(status_id))?;

        info!(status_id = %status_id, "workflow status updated");
        Ok(updated)
    }

    async fn delete_status(&self, status_id: Uuid) -> Result<()> {
        // The guard and the delete run as one statement so a concurrent
        // transition cannot slip a reference in between them.
        let result = sqlx::query(
            r#"
            DELETE FROM workflow_status
            WHERE id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM patient_workflow
                  WHERE current_status_id = $1 OR previous_status_id = $1
              )
              AND NOT EXISTS (
                  SELECT 1 FROM workflow_history
                  WHERE to_status_id = $1 OR from_status_id = $1
              )
              AND NOT EXISTS (
                  SELECT 1 FROM workflow_tasks WHERE status_id = $1
              )
            "#,
        )
        .bind(status_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM workflow_status WHERE id = $1)",
            )
            .bind(status_id)
            .fetch_one(&self.pool)
            .await?;

            return Err(if exists {
                WorkflowError::StatusInUse(status_id)
            } else {
                WorkflowError::StatusNotFound(status_id)
            });
        }

        info!(status_id = %status_id, "workflow status deleted");
        Ok(())
    }

    async fn create_transition(&self, transition: NewTransition) -> Result<StatusTransition> {
        for endpoint in [transition.from_status_id, transition.to_status_id] {
            if self.get_status(endpoint).await?.is_none() {
                return Err(WorkflowError::StatusNotFound(endpoint));
            }
        }

        let created = sqlx::query_as::<_, StatusTransition>(
            r#"
            INSERT INTO workflow_transitions (id, from_status_id, to_status_id, requires_approval)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(transition.from_status_id)
        .bind(transition.to_status_id)
        .bind(transition.requires_approval)
        .fetch_one(&self.pool)
        .await?;

        info!(
            transition_id = %created.id,
            from = %created.from_status_id,
            to = %created.to_status_id,
            "workflow transition created"
        );
        Ok(created)
    }

    async fn delete_transition(&self, transition_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM workflow_transitions WHERE id = $1")
            .bind(transition_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::TransitionNotFound(transition_id));
        }

        info!(transition_id = %transition_id, "workflow transition deleted");
        Ok(())
    }
}
