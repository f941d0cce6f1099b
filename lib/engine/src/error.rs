//! Error types for the engine.
//!
//! Run errors surface at the run boundary: they fail the step and the run,
//! travel on the `run_finished` event, and never crash the engine.

use homeflow_core::WorkflowId;
use homeflow_bus::BusError;
use homeflow_store::StoreError;
use std::fmt;

/// Errors returned synchronously by `start_run` and the manual trigger path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartRunError {
    /// The workflow is absent, disabled, or its definition is invalid.
    NotEligible { workflow_id: WorkflowId },
    /// The trigger node has no outgoing edges to execute.
    NoOutgoingEdges {
        workflow_id: WorkflowId,
        trigger_node_id: String,
    },
    /// No trigger node matched a manual invocation.
    TriggerNotFound {
        workflow_id: WorkflowId,
        trigger_node_id: String,
    },
    /// The run record could not be persisted.
    Store(StoreError),
}

impl fmt::Display for StartRunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotEligible { workflow_id } => {
                write!(f, "not_eligible: workflow {workflow_id} cannot be triggered")
            }
            Self::NoOutgoingEdges {
                workflow_id,
                trigger_node_id,
            } => {
                write!(
                    f,
                    "no_outgoing_edges: trigger '{trigger_node_id}' of workflow {workflow_id} has nothing to execute"
                )
            }
            Self::TriggerNotFound {
                workflow_id,
                trigger_node_id,
            } => {
                write!(
                    f,
                    "trigger '{trigger_node_id}' not found in workflow {workflow_id}"
                )
            }
            Self::Store(e) => write!(f, "failed to persist run: {e}"),
        }
    }
}

impl std::error::Error for StartRunError {}

impl From<StoreError> for StartRunError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Errors that fail a run during traversal or resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// A node's configuration cannot be executed (empty device id, empty
    /// recipient list, and similar execution-time requirements).
    InvalidNode { node_id: String, reason: String },
    /// Publishing to the bus failed.
    PublishFailed { message: String },
    /// A store write failed mid-traversal.
    StoreFailed { message: String },
    /// The email sender reported a failure.
    EmailFailed { message: String },
    /// The device reported a failed command result.
    ResultFailed { message: String },
    /// The pending correlation expired before a result arrived.
    CorrelationExpired,
}

impl RunError {
    /// Stable error code persisted with the run and carried on events.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidNode { .. } => "invalid_node",
            Self::PublishFailed { .. } => "publish_failed",
            Self::StoreFailed { .. } => "store_failed",
            Self::EmailFailed { .. } => "email_failed",
            Self::ResultFailed { .. } => "result_failed",
            Self::CorrelationExpired => "correlation_expired",
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNode { node_id, reason } => {
                write!(f, "invalid_node: node '{node_id}': {reason}")
            }
            Self::PublishFailed { message } => write!(f, "publish_failed: {message}"),
            Self::StoreFailed { message } => write!(f, "store_failed: {message}"),
            Self::EmailFailed { message } => write!(f, "email_failed: {message}"),
            Self::ResultFailed { message } => write!(f, "result_failed: {message}"),
            Self::CorrelationExpired => write!(f, "correlation_expired"),
        }
    }
}

impl std::error::Error for RunError {}

impl From<BusError> for RunError {
    fn from(e: BusError) -> Self {
        Self::PublishFailed {
            message: e.to_string(),
        }
    }
}

impl From<StoreError> for RunError {
    fn from(e: StoreError) -> Self {
        Self::StoreFailed {
            message: e.to_string(),
        }
    }
}

/// Errors from engine lifecycle operations (start, reload).
#[derive(Debug)]
pub enum EngineError {
    /// The store was unavailable.
    Store(StoreError),
    /// A bus subscription could not be established.
    Bus(BusError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Bus(e) => write!(f, "bus error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<BusError> for EngineError {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}
