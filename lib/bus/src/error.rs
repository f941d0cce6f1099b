//! Error types for bus operations.

use std::fmt;

/// Errors from message bus operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Failed to connect to the broker.
    ConnectionFailed { message: String },
    /// Failed to establish a subscription.
    SubscribeFailed { pattern: String, message: String },
    /// Failed to publish a message.
    PublishFailed { topic: String, message: String },
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { message } => {
                write!(f, "bus connection failed: {message}")
            }
            Self::SubscribeFailed { pattern, message } => {
                write!(f, "subscribe to '{pattern}' failed: {message}")
            }
            Self::PublishFailed { topic, message } => {
                write!(f, "publish to '{topic}' failed: {message}")
            }
        }
    }
}

impl std::error::Error for BusError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_error_display() {
        let err = BusError::PublishFailed {
            topic: "hf/device/command/d1".to_string(),
            message: "timed out".to_string(),
        };
        assert!(err.to_string().contains("hf/device/command/d1"));
        assert!(err.to_string().contains("timed out"));
    }
}
