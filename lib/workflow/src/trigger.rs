//! Trigger event snapshots.
//!
//! When a trigger admits a firing, the engine captures a snapshot of the
//! event that caused it. The snapshot is persisted with the run and is the
//! value `logic.if` conditions evaluate against, so its serialized field
//! names are part of the observable contract.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The event snapshot captured when a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEvent {
    /// A device state change admitted by a `trigger.device_state` node.
    State {
        /// The trigger node that matched.
        trigger_node_id: String,
        /// The device that reported the state.
        device_id: String,
        /// The reported state map.
        state: JsonValue,
        /// Event timestamp in epoch milliseconds.
        ts: i64,
        /// Whether the broker flagged the delivery as retained.
        retained: bool,
    },
    /// A cron firing of a `trigger.schedule` node.
    Schedule {
        /// The trigger node that fired.
        trigger_node_id: String,
        /// The cron expression that fired.
        cron: String,
        /// Firing timestamp in epoch milliseconds.
        ts: i64,
    },
    /// A user-initiated firing of a `trigger.manual` node.
    Manual {
        /// The trigger node that was invoked.
        trigger_node_id: String,
        /// Invocation timestamp in epoch milliseconds.
        ts: i64,
    },
}

impl TriggerEvent {
    /// Returns the trigger node this event entered through.
    #[must_use]
    pub fn trigger_node_id(&self) -> &str {
        match self {
            Self::State {
                trigger_node_id, ..
            }
            | Self::Schedule {
                trigger_node_id, ..
            }
            | Self::Manual {
                trigger_node_id, ..
            } => trigger_node_id,
        }
    }

    /// Serializes the snapshot for persistence and condition evaluation.
    #[must_use]
    pub fn to_value(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}
