//! Workflow node kinds and per-kind configuration payloads.
//!
//! Every node carries a `kind` and an opaque `data` payload; the payload
//! schema is determined by the kind and parsed into a typed config during
//! definition validation.

use crate::predicate::{self, CompareOp};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// The recognized node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// User-initiated entry point.
    #[serde(rename = "trigger.manual")]
    ManualTrigger,
    /// Cron-scheduled entry point.
    #[serde(rename = "trigger.schedule")]
    ScheduleTrigger,
    /// Device state-change entry point.
    #[serde(rename = "trigger.device_state")]
    DeviceStateTrigger,
    /// Publish a command to a device.
    #[serde(rename = "action.send_command")]
    SendCommand,
    /// Send an email notification.
    #[serde(rename = "action.notify_email")]
    NotifyEmail,
    /// Pause the traversal.
    #[serde(rename = "logic.sleep")]
    Sleep,
    /// Conditional branch over the trigger event.
    #[serde(rename = "logic.if")]
    If,
    /// Bounded loop over the body edge.
    #[serde(rename = "logic.for")]
    For,
}

impl NodeKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ManualTrigger => "trigger.manual",
            Self::ScheduleTrigger => "trigger.schedule",
            Self::DeviceStateTrigger => "trigger.device_state",
            Self::SendCommand => "action.send_command",
            Self::NotifyEmail => "action.notify_email",
            Self::Sleep => "logic.sleep",
            Self::If => "logic.if",
            Self::For => "logic.for",
        }
    }

    /// Returns true for trigger kinds (graph entry points).
    #[must_use]
    pub const fn is_trigger(&self) -> bool {
        matches!(
            self,
            Self::ManualTrigger | Self::ScheduleTrigger | Self::DeviceStateTrigger
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trigger.manual" => Ok(Self::ManualTrigger),
            "trigger.schedule" => Ok(Self::ScheduleTrigger),
            "trigger.device_state" => Ok(Self::DeviceStateTrigger),
            "action.send_command" => Ok(Self::SendCommand),
            "action.notify_email" => Ok(Self::NotifyEmail),
            "logic.sleep" => Ok(Self::Sleep),
            "logic.if" => Ok(Self::If),
            "logic.for" => Ok(Self::For),
            _ => Err(()),
        }
    }
}

/// Configuration for `trigger.manual` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualTriggerConfig {}

/// Configuration for `trigger.schedule` nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTriggerConfig {
    /// Six-field cron expression with seconds precision.
    pub cron: String,
    /// Minimum seconds between admitted firings; `<= 0` disables the gate.
    #[serde(default)]
    pub cooldown_sec: i64,
}

/// Configuration for `trigger.device_state` nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStateTriggerConfig {
    /// The device whose state events this trigger observes.
    pub device_id: String,
    /// State key the predicate inspects; empty matches any message.
    #[serde(default)]
    pub key: String,
    /// Comparison operator.
    #[serde(default)]
    pub op: CompareOp,
    /// Expected value for the comparison.
    #[serde(default)]
    pub value: JsonValue,
    /// Minimum seconds between admitted firings; `<= 0` disables the gate.
    #[serde(default)]
    pub cooldown_sec: i64,
    /// Skip broker-retained deliveries.
    #[serde(default)]
    pub ignore_retained: bool,
}

impl DeviceStateTriggerConfig {
    /// Evaluates the trigger predicate against a decoded state map.
    ///
    /// An empty key matches any message. The key is looked up directly in
    /// the state map (no path traversal), and `exists` asks only whether
    /// the key is present, null included.
    #[must_use]
    pub fn matches_state(&self, state: &JsonValue) -> bool {
        if self.key.is_empty() {
            return true;
        }
        let actual = state.as_object().and_then(|m| m.get(&self.key));
        if self.op == CompareOp::Exists {
            return actual.is_some();
        }
        predicate::matches(self.op, actual, &self.value)
    }
}

/// Configuration for `action.send_command` nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendCommandConfig {
    /// Target device; required at execution time.
    #[serde(default)]
    pub device_id: String,
    /// Command name; defaults to `set_state` when blank.
    #[serde(default)]
    pub command: String,
    /// Command arguments, forwarded verbatim.
    #[serde(default)]
    pub args: JsonValue,
    /// Suspend the run until the device reports a result.
    #[serde(default)]
    pub wait_for_result: bool,
    /// Seconds to keep the pending correlation alive; `<= 0` uses the default.
    #[serde(default)]
    pub result_timeout_sec: i64,
}

/// A pre-resolved email recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Destination address.
    pub email: String,
    /// Display name; falls back to a constant when absent.
    #[serde(default)]
    pub name: Option<String>,
}

/// Configuration for `action.notify_email` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifyEmailConfig {
    /// Email subject; required at execution time.
    #[serde(default)]
    pub subject: String,
    /// Email body; required at execution time.
    #[serde(default)]
    pub message: String,
    /// Pre-resolved recipients; required non-empty at execution time.
    #[serde(default)]
    pub recipients: Vec<Recipient>,
}

/// Configuration for `logic.sleep` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SleepConfig {
    /// Sleep duration in seconds, clamped to `>= 0` at execution time.
    #[serde(default)]
    pub duration_sec: i64,
}

impl SleepConfig {
    /// Returns the effective duration in whole seconds.
    #[must_use]
    pub fn clamped_secs(&self) -> u64 {
        self.duration_sec.max(0) as u64
    }
}

/// Configuration for `logic.if` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IfConfig {
    /// Dot-delimited path into the trigger event; empty matches.
    #[serde(default)]
    pub path: String,
    /// Comparison operator.
    #[serde(default)]
    pub op: CompareOp,
    /// Expected value for the comparison.
    #[serde(default)]
    pub value: JsonValue,
}

impl IfConfig {
    /// Evaluates the condition against the run's trigger event.
    #[must_use]
    pub fn matches_event(&self, event: &JsonValue) -> bool {
        if self.path.is_empty() {
            return true;
        }
        let actual = predicate::resolve_path(event, &self.path);
        predicate::matches(self.op, actual, &self.value)
    }
}

/// Configuration for `logic.for` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForConfig {
    /// Number of body iterations; negative counts behave as zero.
    #[serde(default)]
    pub count: i64,
}

impl ForConfig {
    /// Returns the effective iteration count.
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.count.max(0) as u64
    }
}

/// Typed configuration for a node, parsed from its `data` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    /// `trigger.manual`
    ManualTrigger(ManualTriggerConfig),
    /// `trigger.schedule`
    ScheduleTrigger(ScheduleTriggerConfig),
    /// `trigger.device_state`
    DeviceStateTrigger(DeviceStateTriggerConfig),
    /// `action.send_command`
    SendCommand(SendCommandConfig),
    /// `action.notify_email`
    NotifyEmail(NotifyEmailConfig),
    /// `logic.sleep`
    Sleep(SleepConfig),
    /// `logic.if`
    If(IfConfig),
    /// `logic.for`
    For(ForConfig),
}

impl NodeConfig {
    /// Returns the kind this configuration belongs to.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::ManualTrigger(_) => NodeKind::ManualTrigger,
            Self::ScheduleTrigger(_) => NodeKind::ScheduleTrigger,
            Self::DeviceStateTrigger(_) => NodeKind::DeviceStateTrigger,
            Self::SendCommand(_) => NodeKind::SendCommand,
            Self::NotifyEmail(_) => NodeKind::NotifyEmail,
            Self::Sleep(_) => NodeKind::Sleep,
            Self::If(_) => NodeKind::If,
            Self::For(_) => NodeKind::For,
        }
    }
}

/// A validated workflow node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Node id, unique within the workflow.
    pub id: String,
    /// The node kind.
    pub kind: NodeKind,
    /// The raw `data` payload as authored.
    pub data: JsonValue,
    /// The typed configuration parsed from `data`.
    pub config: NodeConfig,
}

impl Node {
    /// Returns true for trigger nodes (graph entry points).
    #[must_use]
    pub const fn is_trigger(&self) -> bool {
        self.kind.is_trigger()
    }

    /// Serializes the node definition, used as the step input snapshot.
    #[must_use]
    pub fn definition_snapshot(&self) -> JsonValue {
        serde_json::json!({
            "id": self.id,
            "kind": self.kind.as_str(),
            "data": self.data,
        })
    }
}
