//! Durable store adapter for the homeflow automation engine.
//!
//! The engine consumes the narrow [`WorkflowStore`] trait; the production
//! implementation persists to PostgreSQL via sqlx. The engine issues no
//! other queries: reads of the workflow catalog happen through the periodic
//! reload, and runs, steps, and pending correlations are write-mostly.

pub mod error;
pub mod postgres;
pub mod store;

pub use error::StoreError;
pub use postgres::PgWorkflowStore;
pub use store::WorkflowStore;
