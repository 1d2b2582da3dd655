use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use workflow_engine::WorkflowEngine;

/// Shared server state: the database pool and the workflow engine built
/// over it.
#[derive(Clone)]
pub struct WorkflowServer {
    pub db_pool: PgPool,
    pub engine: Arc<WorkflowEngine>,
}

impl WorkflowServer {
    /// Connect to Postgres and build the engine.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;

        info!("database connection pool created");
        Ok(Self::from_pool(db_pool))
    }

    /// Build the server state over an existing pool.
    pub fn from_pool(db_pool: PgPool) -> Self {
        let engine = Arc::new(WorkflowEngine::with_postgres(db_pool.clone()));
        Self { db_pool, engine }
    }

    /// Apply pending database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.db_pool).await?;
        info!("database migrations applied");
        Ok(())
    }

    /// Check that the database answers.
    pub async fn is_healthy(&self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(&self.db_pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!("database health check failed: {}", e);
                false
            }
        }
    }
}
