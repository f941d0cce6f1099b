//! `hdp.v1` wire envelopes.
//!
//! All device-hub traffic is JSON with a `schema` marker and a `type`
//! discriminator. Decoding is lenient at the edge: payloads with an unknown
//! schema or type, or that fail to parse, are dropped silently.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The device-hub protocol schema this engine speaks.
pub const HDP_SCHEMA: &str = "hdp.v1";

/// A device state report, delivered on `<ns>/device/state/<device_id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    /// Protocol schema marker.
    pub schema: String,
    /// Envelope type discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    /// The reporting device.
    pub device_id: String,
    /// The reported state map.
    pub state: JsonValue,
    /// Report timestamp in epoch milliseconds.
    #[serde(default)]
    pub ts: i64,
}

impl StateEvent {
    /// Decodes a state event, returning `None` for anything that is not a
    /// well-formed `hdp.v1` state envelope.
    #[must_use]
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let event: Self = serde_json::from_slice(payload).ok()?;
        (event.schema == HDP_SCHEMA && event.kind == "state").then_some(event)
    }
}

/// An asynchronous command result, delivered on
/// `<ns>/device/command_result/<device_id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Protocol schema marker.
    pub schema: String,
    /// Envelope type discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    /// The correlation token issued with the command.
    pub corr: String,
    /// Whether the device executed the command successfully.
    pub success: bool,
    /// Device-reported error, present on failure.
    #[serde(default)]
    pub error: Option<String>,
    /// The reporting device, when known.
    #[serde(default)]
    pub device_id: Option<String>,
}

impl CommandResult {
    /// Decodes a command result, returning `None` for anything that is not
    /// a well-formed `hdp.v1` command_result envelope.
    #[must_use]
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let result: Self = serde_json::from_slice(payload).ok()?;
        (result.schema == HDP_SCHEMA && result.kind == "command_result").then_some(result)
    }
}

/// An outbound device command, published on
/// `<ns>/device/command/<device_id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Protocol schema marker.
    pub schema: String,
    /// Envelope type discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    /// The target device.
    pub device_id: String,
    /// The command name.
    pub command: String,
    /// Command arguments, forwarded verbatim.
    pub args: JsonValue,
    /// Correlation token for the asynchronous result.
    pub corr: String,
    /// Issue timestamp in epoch milliseconds.
    pub ts: i64,
}

impl CommandEnvelope {
    /// Builds a command envelope with the current schema markers.
    #[must_use]
    pub fn new(
        device_id: impl Into<String>,
        command: impl Into<String>,
        args: JsonValue,
        corr: impl Into<String>,
        ts: i64,
    ) -> Self {
        Self {
            schema: HDP_SCHEMA.to_string(),
            kind: "command".to_string(),
            device_id: device_id.into(),
            command: command.into(),
            args,
            corr: corr.into(),
            ts,
        }
    }

    /// Serializes the envelope to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_state_event() {
        let payload = json!({
            "schema": "hdp.v1",
            "type": "state",
            "device_id": "d1",
            "state": {"motion": true},
            "ts": 1000,
        });
        let event = StateEvent::decode(payload.to_string().as_bytes()).expect("decodes");
        assert_eq!(event.device_id, "d1");
        assert_eq!(event.state["motion"], true);
        assert_eq!(event.ts, 1000);
    }

    #[test]
    fn unknown_schema_is_dropped() {
        let payload = json!({
            "schema": "hdp.v2",
            "type": "state",
            "device_id": "d1",
            "state": {},
        });
        assert!(StateEvent::decode(payload.to_string().as_bytes()).is_none());
    }

    #[test]
    fn unknown_type_is_dropped() {
        let payload = json!({
            "schema": "hdp.v1",
            "type": "telemetry",
            "device_id": "d1",
            "state": {},
        });
        assert!(StateEvent::decode(payload.to_string().as_bytes()).is_none());
    }

    #[test]
    fn garbage_is_dropped() {
        assert!(StateEvent::decode(b"not json").is_none());
        assert!(CommandResult::decode(b"{}").is_none());
    }

    #[test]
    fn decode_command_result() {
        let payload = json!({
            "schema": "hdp.v1",
            "type": "command_result",
            "corr": "wf-abc-1000",
            "success": false,
            "error": "unreachable",
        });
        let result = CommandResult::decode(payload.to_string().as_bytes()).expect("decodes");
        assert_eq!(result.corr, "wf-abc-1000");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("unreachable"));
        assert_eq!(result.device_id, None);
    }

    #[test]
    fn command_envelope_wire_shape() {
        let envelope = CommandEnvelope::new("d1", "set_state", json!({"state": "ON"}), "c1", 7);
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(value["schema"], "hdp.v1");
        assert_eq!(value["type"], "command");
        assert_eq!(value["device_id"], "d1");
        assert_eq!(value["args"]["state"], "ON");
        assert_eq!(value["corr"], "c1");
    }
}
