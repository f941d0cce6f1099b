//! Core domain types for the homeflow automation engine.
//!
//! This crate provides the strongly-typed identifiers shared by the
//! workflow model, the persistence layer, and the engine.

pub mod id;

pub use id::{ParseIdError, RunStepId, UserId, WorkflowId, WorkflowRunId};
