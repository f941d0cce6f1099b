//! The narrow persistence seam the engine consumes.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use homeflow_core::{RunStepId, WorkflowRunId};
use homeflow_workflow::{PendingCorrelation, Run, RunStatus, RunStep, StepStatus, Workflow};

/// Persistence operations the engine requires.
///
/// Timeouts are the implementation's concern; every call is expected to
/// return in bounded time.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Lists the full workflow catalog; used by the reload loop.
    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError>;

    /// Persists a freshly started run.
    async fn create_run(&self, run: &Run) -> Result<(), StoreError>;

    /// Marks a run as waiting for a command result.
    ///
    /// A no-op if the run already reached a terminal status.
    async fn mark_run_waiting(&self, run_id: WorkflowRunId) -> Result<(), StoreError>;

    /// Finishes a run with a terminal status.
    ///
    /// Idempotent on the final state: once a run is `success` or `failed`,
    /// later calls leave it unchanged.
    async fn finish_run(
        &self,
        run_id: WorkflowRunId,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Persists a freshly started step.
    async fn create_step(&self, step: &RunStep) -> Result<(), StoreError>;

    /// Finishes a step with a terminal status.
    async fn finish_step(
        &self,
        step_id: RunStepId,
        status: StepStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Records a pending command correlation, overwriting on token collision.
    async fn upsert_pending_correlation(
        &self,
        pending: &PendingCorrelation,
    ) -> Result<(), StoreError>;

    /// Atomically reads and deletes a pending correlation by token.
    ///
    /// Exactly one caller observes the row; later calls with the same token
    /// see `None`.
    async fn consume_pending_correlation(
        &self,
        corr: &str,
    ) -> Result<Option<PendingCorrelation>, StoreError>;

    /// Deletes pending correlations whose deadline has passed, returning the
    /// removed rows so their runs can be settled.
    async fn prune_expired_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingCorrelation>, StoreError>;
}
