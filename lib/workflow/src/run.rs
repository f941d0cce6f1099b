//! Run, step, and pending-correlation records.
//!
//! Runs and steps are created and mutated exclusively by the engine; the
//! store persists them. Pending correlations bridge an outbound device
//! command to its asynchronous result.

use chrono::{DateTime, Utc};
use homeflow_core::{RunStepId, WorkflowId, WorkflowRunId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The state of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Traversal is in progress.
    Running,
    /// Suspended awaiting a command result.
    Waiting,
    /// Finished successfully.
    Success,
    /// Finished with an error.
    Failed,
}

impl RunStatus {
    /// Returns the wire/database name of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Returns true for absorbing states.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// A single execution attempt of one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier for this run.
    pub id: WorkflowRunId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// Current status.
    pub status: RunStatus,
    /// Snapshot of the trigger event that started the run.
    pub trigger_event: JsonValue,
    /// Error message if failed.
    pub error: Option<String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Creates a new running run.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, trigger_event: JsonValue) -> Self {
        Self {
            id: WorkflowRunId::new(),
            workflow_id,
            status: RunStatus::Running,
            trigger_event,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// The state of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The node is executing.
    Running,
    /// The node finished successfully.
    Success,
    /// The node failed.
    Failed,
}

impl StepStatus {
    /// Returns the wire/database name of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// A single node execution within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStep {
    /// Unique identifier for this step.
    pub id: RunStepId,
    /// The run this step belongs to.
    pub run_id: WorkflowRunId,
    /// The node id within the workflow definition.
    pub node_id: String,
    /// Current status.
    pub status: StepStatus,
    /// The node definition as it was at execution time.
    pub input: JsonValue,
    /// Optional output payload.
    pub output: Option<JsonValue>,
    /// Error message if failed.
    pub error: Option<String>,
    /// When the step started.
    pub started_at: DateTime<Utc>,
    /// When the step finished.
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunStep {
    /// Creates a new running step for a node.
    #[must_use]
    pub fn new(run_id: WorkflowRunId, node_id: impl Into<String>, input: JsonValue) -> Self {
        Self {
            id: RunStepId::new(),
            run_id,
            node_id: node_id.into(),
            status: StepStatus::Running,
            input,
            output: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// A pending command correlation awaiting its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCorrelation {
    /// Opaque correlation token, unique across pending rows.
    pub corr: String,
    /// The suspended run.
    pub run_id: WorkflowRunId,
    /// The run's workflow.
    pub workflow_id: WorkflowId,
    /// The device the command was sent to.
    pub device_id: String,
    /// When the correlation was recorded.
    pub created_at: DateTime<Utc>,
    /// When the correlation becomes eligible for pruning.
    pub expires_at: DateTime<Utc>,
}

impl PendingCorrelation {
    /// Returns true once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn run_status_terminal() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Waiting.is_terminal());
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn new_run_is_running() {
        let run = Run::new(WorkflowId::new(), json!({"type": "manual"}));
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());
        assert!(run.error.is_none());
    }

    #[test]
    fn new_step_captures_input() {
        let run_id = WorkflowRunId::new();
        let input = json!({"id": "a1", "kind": "logic.sleep", "data": {"duration_sec": 1}});
        let step = RunStep::new(run_id, "a1", input.clone());
        assert_eq!(step.status, StepStatus::Running);
        assert_eq!(step.input, input);
        assert_eq!(step.node_id, "a1");
    }

    #[test]
    fn pending_correlation_expiry() {
        let now = Utc::now();
        let pending = PendingCorrelation {
            corr: "c1".to_string(),
            run_id: WorkflowRunId::new(),
            workflow_id: WorkflowId::new(),
            device_id: "d1".to_string(),
            created_at: now,
            expires_at: now + Duration::seconds(15),
        };

        assert!(!pending.is_expired(now));
        assert!(pending.is_expired(now + Duration::seconds(15)));
        assert!(pending.is_expired(now + Duration::seconds(16)));
    }

    #[test]
    fn status_serde_names() {
        assert_eq!(serde_json::to_string(&RunStatus::Waiting).unwrap(), "\"waiting\"");
        assert_eq!(serde_json::to_string(&StepStatus::Failed).unwrap(), "\"failed\"");
    }
}
