//! PostgreSQL implementation of the workflow store.
//!
//! Typed IDs are stored in their prefixed string form; definitions, trigger
//! events, and step inputs live in JSONB columns.

use crate::error::StoreError;
use crate::store::WorkflowStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use homeflow_core::{RunStepId, UserId, WorkflowId, WorkflowRunId};
use homeflow_workflow::{PendingCorrelation, Run, RunStatus, RunStep, StepStatus, Workflow};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for workflow catalog queries.
#[derive(FromRow)]
struct WorkflowRow {
    id: String,
    name: String,
    enabled: bool,
    definition: serde_json::Value,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkflowRow {
    fn try_into_record(self) -> Result<Workflow, StoreError> {
        let id = WorkflowId::from_str(&self.id).map_err(|e| StoreError::DecodeFailed {
            message: format!("invalid workflow id '{}': {}", self.id, e),
        })?;
        let created_by = self
            .created_by
            .map(|raw| {
                UserId::from_str(&raw).map_err(|e| StoreError::DecodeFailed {
                    message: format!("invalid user id '{raw}': {e}"),
                })
            })
            .transpose()?;

        Ok(Workflow {
            id,
            name: self.name,
            enabled: self.enabled,
            definition: self.definition,
            created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Row type for pending correlation queries.
#[derive(FromRow)]
struct PendingCorrelationRow {
    corr: String,
    run_id: String,
    workflow_id: String,
    device_id: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl PendingCorrelationRow {
    fn try_into_record(self) -> Result<PendingCorrelation, StoreError> {
        let run_id = WorkflowRunId::from_str(&self.run_id).map_err(|e| StoreError::DecodeFailed {
            message: format!("invalid run id '{}': {}", self.run_id, e),
        })?;
        let workflow_id =
            WorkflowId::from_str(&self.workflow_id).map_err(|e| StoreError::DecodeFailed {
                message: format!("invalid workflow id '{}': {}", self.workflow_id, e),
            })?;

        Ok(PendingCorrelation {
            corr: self.corr,
            run_id,
            workflow_id,
            device_id: self.device_id,
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }
}

/// The production store over a PostgreSQL pool.
pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    /// Creates a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let rows: Vec<WorkflowRow> = sqlx::query_as(
            r#"
            SELECT id, name, enabled, definition, created_by, created_at, updated_at
            FROM workflows
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into_record()).collect()
    }

    async fn create_run(&self, run: &Run) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_runs
                (id, workflow_id, status, trigger_event, error, started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(run.id.to_string())
        .bind(run.workflow_id.to_string())
        .bind(run.status.as_str())
        .bind(&run.trigger_event)
        .bind(&run.error)
        .bind(run.started_at)
        .bind(run.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_run_waiting(&self, run_id: WorkflowRunId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE workflow_runs
            SET status = 'waiting'
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: WorkflowRunId,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        // Terminal states are absorbing: a run that already finished keeps
        // its first outcome.
        sqlx::query(
            r#"
            UPDATE workflow_runs
            SET status = $2, error = $3, finished_at = NOW()
            WHERE id = $1 AND status NOT IN ('success', 'failed')
            "#,
        )
        .bind(run_id.to_string())
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_step(&self, step: &RunStep) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_run_steps
                (id, run_id, node_id, status, input, output, error, started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(step.id.to_string())
        .bind(step.run_id.to_string())
        .bind(&step.node_id)
        .bind(step.status.as_str())
        .bind(&step.input)
        .bind(&step.output)
        .bind(&step.error)
        .bind(step.started_at)
        .bind(step.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finish_step(
        &self,
        step_id: RunStepId,
        status: StepStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE workflow_run_steps
            SET status = $2, error = $3, finished_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(step_id.to_string())
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_pending_correlation(
        &self,
        pending: &PendingCorrelation,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pending_correlations
                (corr, run_id, workflow_id, device_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (corr) DO UPDATE
            SET run_id = EXCLUDED.run_id,
                workflow_id = EXCLUDED.workflow_id,
                device_id = EXCLUDED.device_id,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&pending.corr)
        .bind(pending.run_id.to_string())
        .bind(pending.workflow_id.to_string())
        .bind(&pending.device_id)
        .bind(pending.created_at)
        .bind(pending.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume_pending_correlation(
        &self,
        corr: &str,
    ) -> Result<Option<PendingCorrelation>, StoreError> {
        // DELETE ... RETURNING makes consumption atomic: exactly one caller
        // sees the row.
        let row: Option<PendingCorrelationRow> = sqlx::query_as(
            r#"
            DELETE FROM pending_correlations
            WHERE corr = $1
            RETURNING corr, run_id, workflow_id, device_id, created_at, expires_at
            "#,
        )
        .bind(corr)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into_record()).transpose()
    }

    async fn prune_expired_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingCorrelation>, StoreError> {
        let rows: Vec<PendingCorrelationRow> = sqlx::query_as(
            r#"
            DELETE FROM pending_correlations
            WHERE expires_at <= $1
            RETURNING corr, run_id, workflow_id, device_id, created_at, expires_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into_record()).collect()
    }
}
