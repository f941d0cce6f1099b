//! Strongly-typed ID types for domain entities.
//!
//! IDs are ULIDs rendered with a short type prefix (`wf_…`, `run_…`), so
//! logs, database rows, and wire payloads stay self-describing. Node ids
//! are not listed here: within a workflow definition they are free-form
//! strings chosen by the user and only unique per workflow.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when a string is not a valid ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The ID type that failed to parse.
    pub id_type: &'static str,
    /// The rejected input.
    pub input: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a valid {}", self.input, self.id_type)
    }
}

impl std::error::Error for ParseIdError {}

/// Declares a prefixed ULID id type.
///
/// Generated ids display as `<prefix>_<ulid>` and parse from either that
/// form or a bare ULID (rows written by other services may omit the
/// prefix).
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident => $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Generates a fresh, time-ordered id.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(input: &str) -> Result<Self, Self::Err> {
                let raw = input
                    .strip_prefix(concat!($prefix, "_"))
                    .unwrap_or(input);
                Ulid::from_string(raw)
                    .map(Self)
                    .map_err(|_| ParseIdError {
                        id_type: stringify!($name),
                        input: input.to_string(),
                    })
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a user.
    UserId => "usr"
);

entity_id!(
    /// Unique identifier for a workflow.
    WorkflowId => "wf"
);

entity_id!(
    /// Unique identifier for a single execution (run) of a workflow.
    WorkflowRunId => "run"
);

entity_id!(
    /// Unique identifier for a node execution (step) within a run.
    RunStepId => "step"
);
