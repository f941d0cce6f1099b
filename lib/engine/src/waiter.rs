//! Correlation waiter: settles suspended runs from command results.
//!
//! Consumption of a pending correlation is exactly-once (atomic
//! delete-and-return in the store), so duplicate result deliveries and
//! racing pruner sweeps cannot double-finish a run. A result whose token is
//! unknown, already consumed, or pruned is dropped silently.

use crate::error::RunError;
use crate::event::RunEvent;
use crate::hub::RunEventHub;
use chrono::Utc;
use homeflow_bus::CommandResult;
use homeflow_store::WorkflowStore;
use homeflow_workflow::RunStatus;

/// Decodes and handles one command-result payload.
pub(crate) async fn handle_result_payload(
    store: &dyn WorkflowStore,
    hub: &RunEventHub,
    payload: &[u8],
) {
    let Some(result) = CommandResult::decode(payload) else {
        return;
    };
    handle_result(store, hub, result).await;
}

/// Consumes the pending correlation and finishes the suspended run.
pub(crate) async fn handle_result(
    store: &dyn WorkflowStore,
    hub: &RunEventHub,
    result: CommandResult,
) {
    let pending = match store.consume_pending_correlation(&result.corr).await {
        Ok(Some(pending)) => pending,
        Ok(None) => {
            tracing::debug!(corr = %result.corr, "dropping command result with unknown correlation");
            return;
        }
        Err(e) => {
            tracing::warn!(corr = %result.corr, error = %e, "failed to consume pending correlation");
            return;
        }
    };

    let (status, status_str, error) = if result.success {
        (RunStatus::Success, "success", None)
    } else {
        let message = result
            .error
            .unwrap_or_else(|| "command failed".to_string());
        let error = RunError::ResultFailed { message };
        (RunStatus::Failed, "failed", Some(error.to_string()))
    };

    tracing::info!(
        run_id = %pending.run_id,
        workflow_id = %pending.workflow_id,
        corr = %pending.corr,
        status = status_str,
        "command result resolved suspended run"
    );

    if let Err(e) = store
        .finish_run(pending.run_id, status, error.as_deref())
        .await
    {
        tracing::warn!(run_id = %pending.run_id, error = %e, "failed to persist run result");
    }
    hub.publish(RunEvent::run_finished(
        pending.run_id,
        pending.workflow_id,
        status_str,
        error,
    ));
}

/// Sweeps expired pending correlations and fails their runs.
///
/// A run whose correlation expired before any result arrived finishes
/// `failed` with `correlation_expired`; `finish_run` is idempotent on the
/// final state, so a result that raced the sweep still wins only once.
pub(crate) async fn prune_expired(store: &dyn WorkflowStore, hub: &RunEventHub) {
    let now = Utc::now();
    let expired = match store.prune_expired_pending(now).await {
        Ok(expired) => expired,
        Err(e) => {
            tracing::warn!(error = %e, "failed to prune expired pending correlations");
            return;
        }
    };

    for pending in expired {
        let error = RunError::CorrelationExpired.to_string();
        tracing::warn!(
            run_id = %pending.run_id,
            workflow_id = %pending.workflow_id,
            corr = %pending.corr,
            "pending correlation expired, failing run"
        );
        if let Err(e) = store
            .finish_run(pending.run_id, RunStatus::Failed, Some(&error))
            .await
        {
            tracing::warn!(run_id = %pending.run_id, error = %e, "failed to persist expired run");
        }
        hub.publish(RunEvent::run_finished(
            pending.run_id,
            pending.workflow_id,
            "failed",
            Some(error),
        ));
    }
}
