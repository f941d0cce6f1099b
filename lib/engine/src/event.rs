//! Node-level run events streamed to hub subscribers.
//!
//! When bridged to a WebSocket the serialized field names below are the
//! on-the-wire contract, so optional fields are omitted rather than null.

use homeflow_core::{RunStepId, WorkflowId, WorkflowRunId};
use homeflow_workflow::NodeKind;
use serde::{Deserialize, Serialize};

/// The kind of a run event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    /// A run record was created and traversal is about to begin.
    RunStarted,
    /// A node began executing.
    NodeStarted,
    /// A node finished executing.
    NodeFinished,
    /// The run suspended awaiting a command result.
    RunWaiting,
    /// The run reached a terminal status.
    RunFinished,
}

/// A single event in a run's stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// The event kind.
    #[serde(rename = "event")]
    pub kind: RunEventKind,
    /// The run this event belongs to.
    pub run_id: WorkflowRunId,
    /// The run's workflow.
    pub workflow_id: WorkflowId,
    /// The node involved, for node-level events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// The persisted step, for node-level events on non-trigger nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<RunStepId>,
    /// The node kind, for node-level events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_kind: Option<NodeKind>,
    /// Terminal status, for `node_finished` and `run_finished`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Error text, when the node or run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Sleep duration, on `node_started` for `logic.sleep` nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep_duration_sec: Option<u64>,
}

impl RunEvent {
    fn base(kind: RunEventKind, run_id: WorkflowRunId, workflow_id: WorkflowId) -> Self {
        Self {
            kind,
            run_id,
            workflow_id,
            node_id: None,
            step_id: None,
            node_kind: None,
            status: None,
            error: None,
            sleep_duration_sec: None,
        }
    }

    /// A `run_started` event.
    #[must_use]
    pub fn run_started(run_id: WorkflowRunId, workflow_id: WorkflowId) -> Self {
        Self::base(RunEventKind::RunStarted, run_id, workflow_id)
    }

    /// A `run_waiting` event.
    #[must_use]
    pub fn run_waiting(run_id: WorkflowRunId, workflow_id: WorkflowId) -> Self {
        Self::base(RunEventKind::RunWaiting, run_id, workflow_id)
    }

    /// A `run_finished` event with the terminal status and optional error.
    #[must_use]
    pub fn run_finished(
        run_id: WorkflowRunId,
        workflow_id: WorkflowId,
        status: &'static str,
        error: Option<String>,
    ) -> Self {
        let mut event = Self::base(RunEventKind::RunFinished, run_id, workflow_id);
        event.status = Some(status.to_string());
        event.error = error;
        event
    }

    /// A `node_started` event.
    #[must_use]
    pub fn node_started(
        run_id: WorkflowRunId,
        workflow_id: WorkflowId,
        node_id: impl Into<String>,
        node_kind: NodeKind,
        step_id: Option<RunStepId>,
    ) -> Self {
        let mut event = Self::base(RunEventKind::NodeStarted, run_id, workflow_id);
        event.node_id = Some(node_id.into());
        event.node_kind = Some(node_kind);
        event.step_id = step_id;
        event
    }

    /// A `node_finished` event.
    #[must_use]
    pub fn node_finished(
        run_id: WorkflowRunId,
        workflow_id: WorkflowId,
        node_id: impl Into<String>,
        node_kind: NodeKind,
        step_id: Option<RunStepId>,
        status: &'static str,
        error: Option<String>,
    ) -> Self {
        let mut event = Self::base(RunEventKind::NodeFinished, run_id, workflow_id);
        event.node_id = Some(node_id.into());
        event.node_kind = Some(node_kind);
        event.step_id = step_id;
        event.status = Some(status.to_string());
        event.error = error;
        event
    }

    /// Attaches a sleep duration (`node_started` on `logic.sleep`).
    #[must_use]
    pub fn with_sleep_duration(mut self, seconds: u64) -> Self {
        self.sleep_duration_sec = Some(seconds);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_are_omitted() {
        let event = RunEvent::run_started(WorkflowRunId::new(), WorkflowId::new());
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["event"], "run_started");
        assert!(value.get("node_id").is_none());
        assert!(value.get("status").is_none());
        assert!(value.get("sleep_duration_sec").is_none());
    }

    #[test]
    fn node_finished_carries_status_and_error() {
        let event = RunEvent::node_finished(
            WorkflowRunId::new(),
            WorkflowId::new(),
            "a1",
            NodeKind::NotifyEmail,
            Some(RunStepId::new()),
            "failed",
            Some("email_failed: 500".to_string()),
        );
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["event"], "node_finished");
        assert_eq!(value["node_id"], "a1");
        assert_eq!(value["node_kind"], "action.notify_email");
        assert_eq!(value["status"], "failed");
        assert!(value["error"].as_str().unwrap().contains("500"));
    }

    #[test]
    fn sleep_duration_on_node_started() {
        let event = RunEvent::node_started(
            WorkflowRunId::new(),
            WorkflowId::new(),
            "s1",
            NodeKind::Sleep,
            Some(RunStepId::new()),
        )
        .with_sleep_duration(5);
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["sleep_duration_sec"], 5);
    }
}
