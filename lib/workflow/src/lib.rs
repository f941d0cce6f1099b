//! Workflow definition model for the homeflow automation engine.
//!
//! This crate provides:
//!
//! - **Definition model**: parsing and validation of workflow graphs
//!   (nodes, edges, per-kind config payloads)
//! - **Predicate evaluation**: the comparison semantics shared by
//!   device-state triggers and `logic.if` nodes
//! - **Trigger events**: the snapshots captured when a run starts
//! - **Run records**: runs, steps, and pending command correlations

pub mod definition;
pub mod edge;
pub mod error;
pub mod node;
pub mod predicate;
pub mod run;
pub mod trigger;
pub mod workflow;

pub use definition::Definition;
pub use edge::EdgeDef;
pub use error::DefinitionError;
pub use node::{
    DeviceStateTriggerConfig, ForConfig, IfConfig, ManualTriggerConfig, Node, NodeConfig,
    NodeKind, NotifyEmailConfig, Recipient, ScheduleTriggerConfig, SendCommandConfig, SleepConfig,
};
pub use predicate::CompareOp;
pub use run::{PendingCorrelation, Run, RunStatus, RunStep, StepStatus};
pub use trigger::TriggerEvent;
pub use workflow::Workflow;
