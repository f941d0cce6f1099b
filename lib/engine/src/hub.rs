//! Per-run fan-out of node-level events to ephemeral subscribers.
//!
//! Each run gets a bounded broadcast channel. Publication never blocks: a
//! subscriber that falls behind skips ahead and observes a lag marker with
//! the number of missed events, preserving order for everything it does
//! receive. The channel is retired once `run_finished` is published.

use crate::event::{RunEvent, RunEventKind};
use homeflow_core::WorkflowRunId;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Per-subscriber buffer size before lagging kicks in.
const SUBSCRIBER_BUFFER: usize = 256;

/// An item observed by a run event subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum HubItem {
    /// The next event in publication order.
    Event(RunEvent),
    /// The subscriber fell behind and `missed` events were dropped.
    Lagged(u64),
}

/// An active subscription to one run's event stream.
///
/// Dropping the subscription cancels it.
pub struct RunEventSubscription {
    receiver: broadcast::Receiver<RunEvent>,
}

impl RunEventSubscription {
    /// Receives the next item, or `None` once the run's channel is retired
    /// and all buffered events were drained.
    pub async fn recv(&mut self) -> Option<HubItem> {
        match self.receiver.recv().await {
            Ok(event) => Some(HubItem::Event(event)),
            Err(broadcast::error::RecvError::Lagged(missed)) => Some(HubItem::Lagged(missed)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

/// The per-run event hub.
pub struct RunEventHub {
    channels: Mutex<HashMap<WorkflowRunId, broadcast::Sender<RunEvent>>>,
}

impl RunEventHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribes to a run's event stream.
    ///
    /// Subscribing before the run publishes guarantees the full stream;
    /// subscribing later yields only subsequent events. Subscribing to an
    /// already-retired run yields an immediately-ended stream.
    #[must_use]
    pub fn subscribe(&self, run_id: WorkflowRunId) -> RunEventSubscription {
        let mut channels = self.channels.lock().expect("hub lock poisoned");
        let sender = channels
            .entry(run_id)
            .or_insert_with(|| broadcast::channel(SUBSCRIBER_BUFFER).0);
        RunEventSubscription {
            receiver: sender.subscribe(),
        }
    }

    /// Publishes an event to the run's subscribers.
    ///
    /// Events for a given run must be published from a serialized context;
    /// the hub preserves that order per subscriber. `run_finished` retires
    /// the channel.
    pub fn publish(&self, event: RunEvent) {
        let retire = event.kind == RunEventKind::RunFinished;
        let run_id = event.run_id;

        let mut channels = self.channels.lock().expect("hub lock poisoned");
        if let Some(sender) = channels.get(&run_id) {
            // Send fails only when there are no receivers, which is fine.
            let _ = sender.send(event);
        } else if !retire {
            let sender = broadcast::channel(SUBSCRIBER_BUFFER).0;
            let _ = sender.send(event);
            channels.insert(run_id, sender);
        }

        if retire {
            channels.remove(&run_id);
        }
    }

    /// Number of live run channels (for tests and introspection).
    #[must_use]
    pub fn live_channels(&self) -> usize {
        self.channels.lock().expect("hub lock poisoned").len()
    }
}

impl Default for RunEventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homeflow_core::WorkflowId;

    #[tokio::test]
    async fn events_arrive_in_publication_order() {
        let hub = RunEventHub::new();
        let run_id = WorkflowRunId::new();
        let workflow_id = WorkflowId::new();

        let mut subscription = hub.subscribe(run_id);
        hub.publish(RunEvent::run_started(run_id, workflow_id));
        hub.publish(RunEvent::run_waiting(run_id, workflow_id));
        hub.publish(RunEvent::run_finished(run_id, workflow_id, "success", None));

        let kinds: Vec<_> = [
            subscription.recv().await,
            subscription.recv().await,
            subscription.recv().await,
        ]
        .into_iter()
        .map(|item| match item {
            Some(HubItem::Event(e)) => e.kind,
            other => panic!("unexpected item: {other:?}"),
        })
        .collect();

        assert_eq!(
            kinds,
            vec![
                RunEventKind::RunStarted,
                RunEventKind::RunWaiting,
                RunEventKind::RunFinished,
            ]
        );

        // Channel retired after run_finished.
        assert_eq!(hub.live_channels(), 0);
        assert_eq!(subscription.recv().await, None);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_does_not_block() {
        let hub = RunEventHub::new();
        let run_id = WorkflowRunId::new();
        let workflow_id = WorkflowId::new();

        for _ in 0..1000 {
            hub.publish(RunEvent::run_waiting(run_id, workflow_id));
        }
        hub.publish(RunEvent::run_finished(run_id, workflow_id, "success", None));
        assert_eq!(hub.live_channels(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag_marker() {
        let hub = RunEventHub::new();
        let run_id = WorkflowRunId::new();
        let workflow_id = WorkflowId::new();

        let mut subscription = hub.subscribe(run_id);
        for _ in 0..(SUBSCRIBER_BUFFER + 10) {
            hub.publish(RunEvent::run_waiting(run_id, workflow_id));
        }

        match subscription.recv().await {
            Some(HubItem::Lagged(missed)) => assert!(missed >= 10),
            other => panic!("expected lag marker, got {other:?}"),
        }
        // Later items resume in order.
        assert!(matches!(
            subscription.recv().await,
            Some(HubItem::Event(_))
        ));
    }

    #[tokio::test]
    async fn independent_runs_do_not_interleave() {
        let hub = RunEventHub::new();
        let run_a = WorkflowRunId::new();
        let run_b = WorkflowRunId::new();
        let workflow_id = WorkflowId::new();

        let mut sub_a = hub.subscribe(run_a);
        hub.publish(RunEvent::run_started(run_a, workflow_id));
        hub.publish(RunEvent::run_started(run_b, workflow_id));

        match sub_a.recv().await {
            Some(HubItem::Event(event)) => assert_eq!(event.run_id, run_a),
            other => panic!("unexpected item: {other:?}"),
        }
    }
}
