//! Shared in-memory fakes for engine integration tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use homeflow_bus::{topic, BusError, BusHandler, BusMessage, MessageBus, SubscriberHandle};
use homeflow_core::{RunStepId, WorkflowId, WorkflowRunId};
use homeflow_engine::{Engine, EngineConfig, Mailer, MailerError};
use homeflow_store::{StoreError, WorkflowStore};
use homeflow_workflow::{
    PendingCorrelation, Run, RunStatus, RunStep, StepStatus, Workflow,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory store mirroring the Postgres semantics the engine relies on.
#[derive(Default)]
pub struct MemoryStore {
    workflows: Mutex<Vec<Workflow>>,
    runs: Mutex<Vec<Run>>,
    steps: Mutex<Vec<RunStep>>,
    pending: Mutex<HashMap<String, PendingCorrelation>>,
}

impl MemoryStore {
    pub fn with_workflows(workflows: Vec<Workflow>) -> Arc<Self> {
        Arc::new(Self {
            workflows: Mutex::new(workflows),
            ..Self::default()
        })
    }

    pub fn set_enabled(&self, workflow_id: WorkflowId, enabled: bool) {
        let mut workflows = self.workflows.lock().unwrap();
        if let Some(workflow) = workflows.iter_mut().find(|w| w.id == workflow_id) {
            workflow.enabled = enabled;
        }
    }

    pub fn runs(&self) -> Vec<Run> {
        self.runs.lock().unwrap().clone()
    }

    pub fn run(&self, run_id: WorkflowRunId) -> Option<Run> {
        self.runs.lock().unwrap().iter().find(|r| r.id == run_id).cloned()
    }

    pub fn steps_for(&self, run_id: WorkflowRunId) -> Vec<RunStep> {
        self.steps
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.run_id == run_id)
            .cloned()
            .collect()
    }

    pub fn pending_tokens(&self) -> Vec<String> {
        self.pending.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        Ok(self.workflows.lock().unwrap().clone())
    }

    async fn create_run(&self, run: &Run) -> Result<(), StoreError> {
        self.runs.lock().unwrap().push(run.clone());
        Ok(())
    }

    async fn mark_run_waiting(&self, run_id: WorkflowRunId) -> Result<(), StoreError> {
        let mut runs = self.runs.lock().unwrap();
        if let Some(run) = runs.iter_mut().find(|r| r.id == run_id) {
            if run.status == RunStatus::Running {
                run.status = RunStatus::Waiting;
            }
        }
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: WorkflowRunId,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut runs = self.runs.lock().unwrap();
        if let Some(run) = runs.iter_mut().find(|r| r.id == run_id) {
            if !run.status.is_terminal() {
                run.status = status;
                run.error = error.map(str::to_string);
                run.finished_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn create_step(&self, step: &RunStep) -> Result<(), StoreError> {
        self.steps.lock().unwrap().push(step.clone());
        Ok(())
    }

    async fn finish_step(
        &self,
        step_id: RunStepId,
        status: StepStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut steps = self.steps.lock().unwrap();
        if let Some(step) = steps.iter_mut().find(|s| s.id == step_id) {
            step.status = status;
            step.error = error.map(str::to_string);
            step.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn upsert_pending_correlation(
        &self,
        pending: &PendingCorrelation,
    ) -> Result<(), StoreError> {
        self.pending
            .lock()
            .unwrap()
            .insert(pending.corr.clone(), pending.clone());
        Ok(())
    }

    async fn consume_pending_correlation(
        &self,
        corr: &str,
    ) -> Result<Option<PendingCorrelation>, StoreError> {
        Ok(self.pending.lock().unwrap().remove(corr))
    }

    async fn prune_expired_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingCorrelation>, StoreError> {
        let mut pending = self.pending.lock().unwrap();
        let expired: Vec<_> = pending
            .values()
            .filter(|p| p.is_expired(now))
            .cloned()
            .collect();
        for row in &expired {
            pending.remove(&row.corr);
        }
        Ok(expired)
    }
}

/// In-memory bus: subscriptions match MQTT-style patterns, publishes are
/// recorded, and tests inject inbound traffic with [`MemoryBus::deliver`].
#[derive(Default)]
pub struct MemoryBus {
    subscriptions: Mutex<Vec<(String, BusHandler)>>,
    published: Mutex<Vec<(String, Vec<u8>, bool)>>,
}

impl MemoryBus {
    /// Delivers a message to every matching subscription, awaiting each
    /// handler so dispatch completes before this returns.
    pub async fn deliver(&self, topic_name: &str, payload: Vec<u8>, retained: bool) {
        let handlers: Vec<BusHandler> = self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|(pattern, _)| topic::matches(pattern, topic_name))
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in handlers {
            handler(BusMessage {
                topic: topic_name.to_string(),
                payload: payload.clone(),
                retained,
            })
            .await;
        }
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>, bool)> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_to(&self, topic_name: &str) -> Vec<Vec<u8>> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _, _)| t == topic_name)
            .map(|(_, payload, _)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn subscribe(
        &self,
        pattern: &str,
        handler: BusHandler,
    ) -> Result<SubscriberHandle, BusError> {
        self.subscriptions
            .lock()
            .unwrap()
            .push((pattern.to_string(), handler));
        Ok(SubscriberHandle::detached())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), BusError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload, retain));
        Ok(())
    }
}

/// Mailer fake: records sends, optionally failing every request.
#[derive(Default)]
pub struct StubMailer {
    fail_status: Mutex<Option<u16>>,
    sent: Mutex<Vec<(String, String, String, String)>>,
}

impl StubMailer {
    pub fn failing_with(status: u16) -> Arc<Self> {
        let mailer = Self::default();
        *mailer.fail_status.lock().unwrap() = Some(status);
        Arc::new(mailer)
    }

    pub fn sent(&self) -> Vec<(String, String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for StubMailer {
    async fn send(
        &self,
        to: &str,
        user_name: &str,
        subject: &str,
        message: &str,
    ) -> Result<(), MailerError> {
        if let Some(status) = *self.fail_status.lock().unwrap() {
            return Err(MailerError::Rejected { status });
        }
        self.sent.lock().unwrap().push((
            to.to_string(),
            user_name.to_string(),
            subject.to_string(),
            message.to_string(),
        ));
        Ok(())
    }
}

/// A started engine over in-memory fakes.
pub struct Harness {
    pub engine: Arc<Engine>,
    pub store: Arc<MemoryStore>,
    pub bus: Arc<MemoryBus>,
    pub mailer: Arc<StubMailer>,
}

pub const NAMESPACE: &str = "hf";

pub fn test_config() -> EngineConfig {
    EngineConfig {
        namespace: NAMESPACE.to_string(),
        ..EngineConfig::default()
    }
}

pub async fn start_engine(workflows: Vec<Workflow>) -> Harness {
    start_engine_with(workflows, Arc::new(StubMailer::default()), test_config()).await
}

pub async fn start_engine_with(
    workflows: Vec<Workflow>,
    mailer: Arc<StubMailer>,
    config: EngineConfig,
) -> Harness {
    let store = MemoryStore::with_workflows(workflows);
    let bus = Arc::new(MemoryBus::default());
    let engine = Engine::start(
        store.clone() as Arc<dyn WorkflowStore>,
        bus.clone() as Arc<dyn MessageBus>,
        mailer.clone() as Arc<dyn Mailer>,
        config,
    )
    .await
    .expect("engine start");

    Harness {
        engine,
        store,
        bus,
        mailer,
    }
}

/// Polls the store until the run satisfies `predicate`.
pub async fn wait_for_run<F>(store: &MemoryStore, run_id: WorkflowRunId, predicate: F) -> Run
where
    F: Fn(&Run) -> bool,
{
    for _ in 0..1000 {
        if let Some(run) = store.run(run_id) {
            if predicate(&run) {
                return run;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("run {run_id} did not reach the expected state");
}
