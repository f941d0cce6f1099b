//! The publish/subscribe seam the engine consumes.

use crate::error::BusError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// A message delivered to a subscription handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// The concrete topic the message arrived on.
    pub topic: String,
    /// The raw payload bytes.
    pub payload: Vec<u8>,
    /// Whether the broker flagged this delivery as retained (last-known
    /// state delivered upon subscribe).
    pub retained: bool,
}

/// A subscription handler.
///
/// Handlers run on the bus adapter's delivery task; long-running work should
/// be spawned so one slow handler does not stall delivery of later messages.
pub type BusHandler = Arc<dyn Fn(BusMessage) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle to an active subscription; aborting it stops delivery.
#[derive(Debug)]
pub struct SubscriberHandle {
    task: Option<tokio::task::JoinHandle<()>>,
}

impl SubscriberHandle {
    /// Wraps the delivery task of a subscription.
    #[must_use]
    pub fn new(task: tokio::task::JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// A handle with no backing task, for bus implementations that deliver
    /// synchronously (in-memory test fakes).
    #[must_use]
    pub fn detached() -> Self {
        Self { task: None }
    }

    /// Stops delivery for this subscription.
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

/// A topic-based publish/subscribe broker.
///
/// Topic patterns are `/`-separated with MQTT-style wildcards (`+` matches
/// one level, `#` the remainder). Delivery is at-least-once; consumers must
/// tolerate duplicates.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Subscribes `handler` to every topic matching `pattern`.
    async fn subscribe(
        &self,
        pattern: &str,
        handler: BusHandler,
    ) -> Result<SubscriberHandle, BusError>;

    /// Publishes a payload to a concrete topic.
    ///
    /// `retain` asks the broker to keep the message as the topic's last
    /// known value and deliver it to future subscribers.
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), BusError>;
}
