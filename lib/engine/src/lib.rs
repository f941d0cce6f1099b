//! Workflow reconciler, scheduler, and graph executor for homeflow.
//!
//! This crate is the engine core:
//!
//! - **Snapshot & trigger index**: eligible workflows and their device-state
//!   dispatch index, rebuilt atomically by the reload loop
//! - **Cron reconciler**: schedule triggers materialized into timer tasks
//! - **Cooldown table**: per-trigger rate-limit gate
//! - **Run orchestrator**: iterative, depth-first graph traversal with
//!   step-level persistence and suspension on wait-for-result
//! - **Correlation waiter**: consumes command results and settles suspended
//!   runs; a periodic pruner fails runs whose correlation expired
//! - **Run event hub**: per-run fan-out of node-level events

pub mod cooldown;
pub mod cron;
pub mod engine;
pub mod error;
pub mod event;
pub mod hub;
pub mod mailer;
mod runner;
pub mod snapshot;
mod waiter;

pub use cooldown::{CooldownKey, CooldownTable};
pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, RunError, StartRunError};
pub use event::{RunEvent, RunEventKind};
pub use hub::{HubItem, RunEventHub, RunEventSubscription};
pub use mailer::{HttpMailer, Mailer, MailerError, DEFAULT_RECIPIENT_NAME};
pub use snapshot::{DeviceCandidate, EligibleWorkflow, ScheduleEntry, Snapshot};
