//! Message bus adapter for the homeflow automation engine.
//!
//! The engine talks to the device hub over a topic-based broker. This crate
//! provides:
//!
//! - **`MessageBus`**: the narrow publish/subscribe seam the engine consumes
//! - **Topic matching**: MQTT-style `/`-separated topics with `+`/`#` wildcards
//! - **Wire envelopes**: the `hdp.v1` state, command, and command-result JSON
//! - **`NatsBus`**: the production implementation over NATS

pub mod bus;
pub mod envelope;
pub mod error;
pub mod nats;
pub mod topic;

pub use bus::{BusHandler, BusMessage, MessageBus, SubscriberHandle};
pub use envelope::{CommandEnvelope, CommandResult, StateEvent, HDP_SCHEMA};
pub use error::BusError;
pub use nats::NatsBus;
