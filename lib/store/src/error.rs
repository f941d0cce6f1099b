//! Error types for store operations.

use std::fmt;

/// Errors from durable store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A query failed to execute.
    QueryFailed { message: String },
    /// A row could not be decoded into a domain record.
    DecodeFailed { message: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueryFailed { message } => write!(f, "store query failed: {message}"),
            Self::DecodeFailed { message } => write!(f, "store row decode failed: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::QueryFailed {
            message: e.to_string(),
        }
    }
}
