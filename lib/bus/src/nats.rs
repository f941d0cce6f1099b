//! NATS-backed implementation of the message bus.
//!
//! Topics stay MQTT-shaped at the `MessageBus` boundary; this adapter maps
//! them to NATS subjects (`/` -> `.`, `+` -> `*`, `#` -> `>`). The broker's
//! retained flag travels in the `Hdp-Retained` header: the device hub sets
//! it when it republishes last-known state to a fresh subscriber.

use crate::bus::{BusHandler, BusMessage, MessageBus, SubscriberHandle};
use crate::error::BusError;
use crate::topic;
use async_trait::async_trait;
use futures::StreamExt;

/// Header carrying the retained-delivery flag.
pub const RETAINED_HEADER: &str = "Hdp-Retained";

/// A message bus backed by a NATS connection.
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    /// Connects to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::ConnectionFailed {
                message: e.to_string(),
            })?;
        Ok(Self::new(client))
    }

    /// Wraps an existing NATS client.
    #[must_use]
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    fn is_retained(message: &async_nats::Message) -> bool {
        message
            .headers
            .as_ref()
            .and_then(|headers| headers.get(RETAINED_HEADER))
            .is_some_and(|value| value.as_str() == "1")
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn subscribe(
        &self,
        pattern: &str,
        handler: BusHandler,
    ) -> Result<SubscriberHandle, BusError> {
        let subject = topic::to_subject(pattern);
        let mut subscription =
            self.client
                .subscribe(subject)
                .await
                .map_err(|e| BusError::SubscribeFailed {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })?;

        let pattern = pattern.to_string();
        let task = tokio::spawn(async move {
            while let Some(message) = subscription.next().await {
                let retained = Self::is_retained(&message);
                let bus_message = BusMessage {
                    topic: topic::to_topic(message.subject.as_str()),
                    payload: message.payload.to_vec(),
                    retained,
                };
                handler(bus_message).await;
            }
            tracing::debug!(pattern = %pattern, "bus subscription ended");
        });

        Ok(SubscriberHandle::new(task))
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), BusError> {
        let subject = topic::to_subject(topic);

        if retain {
            let mut headers = async_nats::HeaderMap::new();
            headers.insert(RETAINED_HEADER, "1");
            self.client
                .publish_with_headers(subject, headers, payload.into())
                .await
                .map_err(|e| BusError::PublishFailed {
                    topic: topic.to_string(),
                    message: e.to_string(),
                })?;
        } else {
            self.client
                .publish(subject, payload.into())
                .await
                .map_err(|e| BusError::PublishFailed {
                    topic: topic.to_string(),
                    message: e.to_string(),
                })?;
        }

        Ok(())
    }
}
