//! Engine wiring and lifecycle.
//!
//! A single [`Engine`] value owns the shared state: the eligible-workflow
//! snapshot with its trigger index, the cron timer set, and the cooldown
//! table. Starting the engine loads the catalog, subscribes to the device
//! state and command-result topics, and spawns the reload loop, the pending
//! pruner, and the cron fire dispatcher. Runs execute on detached tasks, so
//! stopping the engine cancels its background loops but lets in-flight runs
//! finish best-effort.

use crate::cooldown::{CooldownKey, CooldownTable};
use crate::cron::{CronFire, CronScheduler};
use crate::error::{EngineError, StartRunError};
use crate::event::RunEvent;
use crate::hub::{RunEventHub, RunEventSubscription};
use crate::mailer::Mailer;
use crate::runner::{self, RunContext};
use crate::snapshot::Snapshot;
use crate::waiter;
use chrono::Utc;
use futures::future::BoxFuture;
use homeflow_bus::{BusHandler, BusMessage, MessageBus, StateEvent, SubscriberHandle};
use homeflow_core::{WorkflowId, WorkflowRunId};
use homeflow_store::WorkflowStore;
use homeflow_workflow::{NodeKind, Run, TriggerEvent};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Topic namespace for device traffic (`<ns>/device/...`).
    pub namespace: String,
    /// How often the workflow catalog is reloaded.
    pub reload_interval: Duration,
    /// How often expired pending correlations are swept.
    pub prune_interval: Duration,
    /// Correlation lifetime when a node does not specify one.
    pub default_result_timeout_sec: i64,
    /// Seed cooldowns at startup so retained deliveries cannot burst past
    /// rate limits. Off by default: it also delays the first legitimate
    /// firing of every gated trigger by one window.
    pub warm_cooldowns_on_start: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: "homeflow".to_string(),
            reload_interval: Duration::from_secs(10),
            prune_interval: Duration::from_secs(60),
            default_result_timeout_sec: 15,
            warm_cooldowns_on_start: false,
        }
    }
}

/// The automation engine.
pub struct Engine {
    store: Arc<dyn WorkflowStore>,
    bus: Arc<dyn MessageBus>,
    config: EngineConfig,
    hub: Arc<RunEventHub>,
    run_ctx: Arc<RunContext>,
    snapshot: RwLock<Arc<Snapshot>>,
    cooldowns: CooldownTable,
    cron: CronScheduler,
    cron_fires: Mutex<Option<mpsc::Receiver<CronFire>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    subscriptions: Mutex<Vec<SubscriberHandle>>,
}

impl Engine {
    /// Builds and starts an engine: loads the catalog, subscribes to bus
    /// topics, and spawns the background loops.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial catalog load or a bus subscription
    /// fails.
    pub async fn start(
        store: Arc<dyn WorkflowStore>,
        bus: Arc<dyn MessageBus>,
        mailer: Arc<dyn Mailer>,
        config: EngineConfig,
    ) -> Result<Arc<Self>, EngineError> {
        let engine = Self::build(store, bus, mailer, config);
        Self::bootstrap(&engine).await?;
        Ok(engine)
    }

    fn build(
        store: Arc<dyn WorkflowStore>,
        bus: Arc<dyn MessageBus>,
        mailer: Arc<dyn Mailer>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let hub = Arc::new(RunEventHub::new());
        let (fires_tx, fires_rx) = mpsc::channel(64);
        let run_ctx = Arc::new(RunContext {
            store: store.clone(),
            bus: bus.clone(),
            mailer,
            hub: hub.clone(),
            namespace: config.namespace.clone(),
            default_result_timeout_sec: config.default_result_timeout_sec,
        });

        Arc::new(Self {
            store,
            bus,
            config,
            hub,
            run_ctx,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            cooldowns: CooldownTable::new(),
            cron: CronScheduler::new(fires_tx),
            cron_fires: Mutex::new(Some(fires_rx)),
            tasks: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    async fn bootstrap(engine: &Arc<Self>) -> Result<(), EngineError> {
        let catalog = engine.store.list_workflows().await?;
        let snapshot = Snapshot::build(&catalog);

        if engine.config.warm_cooldowns_on_start {
            let now = Utc::now();
            for candidate in snapshot.device_candidates_all() {
                if candidate.config.cooldown_sec > 0 {
                    engine.cooldowns.warm(
                        CooldownKey::new(candidate.workflow_id, &candidate.trigger_node_id),
                        now,
                    );
                }
            }
        }

        engine.install_snapshot(snapshot);

        let state_topic = format!("{}/device/state/+", engine.config.namespace);
        let state_subscription = engine
            .bus
            .subscribe(&state_topic, Self::handler(engine, Self::handle_state_message))
            .await?;

        let result_topic = format!("{}/device/command_result/+", engine.config.namespace);
        let result_subscription = engine
            .bus
            .subscribe(
                &result_topic,
                Self::handler(engine, Self::handle_result_message),
            )
            .await?;

        {
            let mut subscriptions = engine.subscriptions.lock().expect("subscriptions lock");
            subscriptions.push(state_subscription);
            subscriptions.push(result_subscription);
        }

        let mut tasks = engine.tasks.lock().expect("tasks lock");
        if let Some(fires) = engine.cron_fires.lock().expect("cron fires lock").take() {
            tasks.push(Self::spawn_cron_dispatcher(engine, fires));
        }
        tasks.push(Self::spawn_reload_loop(engine));
        tasks.push(Self::spawn_pruner(engine));
        drop(tasks);

        tracing::info!(
            workflows = engine.current_snapshot().len(),
            namespace = %engine.config.namespace,
            "engine started"
        );
        Ok(())
    }

    /// Stops the background loops, timers, and bus handlers.
    ///
    /// In-flight runs keep executing best-effort; they are not durable
    /// across a process restart.
    pub fn stop(&self) {
        for task in self.tasks.lock().expect("tasks lock").drain(..) {
            task.abort();
        }
        for subscription in self.subscriptions.lock().expect("subscriptions lock").drain(..) {
            subscription.abort();
        }
        self.cron.shutdown();
        tracing::info!("engine stopped");
    }

    /// Reloads the workflow catalog and reconciles indices and cron timers.
    ///
    /// Runs periodically, and on demand after catalog edits.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be listed; the previous
    /// snapshot stays in effect.
    pub async fn reload(&self) -> Result<(), EngineError> {
        let catalog = self.store.list_workflows().await?;
        let snapshot = Snapshot::build(&catalog);
        tracing::debug!(workflows = snapshot.len(), "catalog reloaded");
        self.install_snapshot(snapshot);
        Ok(())
    }

    /// Subscribes to a run's live event stream.
    #[must_use]
    pub fn subscribe_run(&self, run_id: WorkflowRunId) -> RunEventSubscription {
        self.hub.subscribe(run_id)
    }

    /// Starts a run of `workflow_id` from `trigger_node_id`.
    ///
    /// Returns the run id as soon as the run record exists and
    /// `run_started` is published; the graph executes on a detached task
    /// whose lifetime is independent of the caller.
    ///
    /// # Errors
    ///
    /// Returns [`StartRunError::NotEligible`] when the workflow is absent
    /// from the eligible snapshot, [`StartRunError::NoOutgoingEdges`] when
    /// the trigger has nothing to execute, and a store error when the run
    /// record cannot be persisted.
    pub async fn start_run(
        &self,
        workflow_id: WorkflowId,
        trigger_node_id: &str,
        event: TriggerEvent,
    ) -> Result<WorkflowRunId, StartRunError> {
        let snapshot = self.current_snapshot();
        let Some(workflow) = snapshot.workflow(workflow_id) else {
            return Err(StartRunError::NotEligible { workflow_id });
        };

        let start_nodes: Vec<String> = workflow
            .definition
            .successors(trigger_node_id)
            .map(|n| n.id.clone())
            .collect();
        if start_nodes.is_empty() {
            return Err(StartRunError::NoOutgoingEdges {
                workflow_id,
                trigger_node_id: trigger_node_id.to_string(),
            });
        }

        let run = Run::new(workflow_id, event.to_value());
        self.store.create_run(&run).await?;
        tracing::info!(
            run_id = %run.id,
            workflow_id = %workflow_id,
            trigger_node_id = %trigger_node_id,
            "run started"
        );
        self.hub.publish(RunEvent::run_started(run.id, workflow_id));

        let ctx = self.run_ctx.clone();
        let workflow = workflow.clone();
        let run_id = run.id;
        let trigger_event = run.trigger_event;
        tokio::spawn(async move {
            runner::drive(ctx, workflow, run_id, start_nodes, trigger_event).await;
        });

        Ok(run_id)
    }

    /// Fires a workflow's manual trigger.
    ///
    /// With `trigger_node_id` absent, the definition's first
    /// `trigger.manual` node is used.
    ///
    /// # Errors
    ///
    /// Returns [`StartRunError::TriggerNotFound`] when the node does not
    /// exist or is not a trigger, plus the `start_run` errors.
    pub async fn trigger_manual(
        &self,
        workflow_id: WorkflowId,
        trigger_node_id: Option<&str>,
    ) -> Result<WorkflowRunId, StartRunError> {
        let node_id = {
            let snapshot = self.current_snapshot();
            let Some(workflow) = snapshot.workflow(workflow_id) else {
                return Err(StartRunError::NotEligible { workflow_id });
            };

            match trigger_node_id {
                Some(id) => {
                    let node = workflow.definition.node(id);
                    if !node.is_some_and(|n| n.is_trigger()) {
                        return Err(StartRunError::TriggerNotFound {
                            workflow_id,
                            trigger_node_id: id.to_string(),
                        });
                    }
                    id.to_string()
                }
                None => workflow
                    .definition
                    .triggers()
                    .find(|n| n.kind == NodeKind::ManualTrigger)
                    .map(|n| n.id.clone())
                    .ok_or(StartRunError::TriggerNotFound {
                        workflow_id,
                        trigger_node_id: NodeKind::ManualTrigger.as_str().to_string(),
                    })?,
            }
        };

        let event = TriggerEvent::Manual {
            trigger_node_id: node_id.clone(),
            ts: Utc::now().timestamp_millis(),
        };
        self.start_run(workflow_id, &node_id, event).await
    }

    /// Fires a schedule trigger through the cooldown gate, as the cron
    /// dispatcher does. Returns `None` when the gate suppressed the firing.
    ///
    /// # Errors
    ///
    /// Returns [`StartRunError::TriggerNotFound`] when the workflow has no
    /// such schedule trigger, plus the `start_run` errors.
    pub async fn fire_schedule_trigger(
        &self,
        workflow_id: WorkflowId,
        trigger_node_id: &str,
    ) -> Result<Option<WorkflowRunId>, StartRunError> {
        let fire = {
            let snapshot = self.current_snapshot();
            let entry = snapshot
                .schedule_entries()
                .iter()
                .find(|e| e.workflow_id == workflow_id && e.trigger_node_id == trigger_node_id)
                .ok_or(StartRunError::TriggerNotFound {
                    workflow_id,
                    trigger_node_id: trigger_node_id.to_string(),
                })?;

            CronFire {
                workflow_id: entry.workflow_id,
                trigger_node_id: entry.trigger_node_id.clone(),
                cron: entry.cron.clone(),
                cooldown_sec: entry.cooldown_sec,
            }
        };
        self.dispatch_cron_fire(fire).await
    }

    fn install_snapshot(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().expect("snapshot lock poisoned") = snapshot.clone();
        self.cron.reconcile(snapshot.schedule_entries());
    }

    fn current_snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().expect("snapshot lock poisoned").clone()
    }

    /// Wraps an engine method into a bus handler holding only a weak
    /// reference, so subscriptions never keep a stopped engine alive.
    fn handler<F>(engine: &Arc<Self>, f: F) -> BusHandler
    where
        F: Fn(Arc<Self>, BusMessage) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(engine);
        Arc::new(move |message: BusMessage| -> BoxFuture<'static, ()> {
            let weak = weak.clone();
            let future = weak.upgrade().map(|engine| f(engine, message));
            Box::pin(async move {
                if let Some(future) = future {
                    future.await;
                }
            })
        })
    }

    fn handle_state_message(self: Arc<Self>, message: BusMessage) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let Some(event) = StateEvent::decode(&message.payload) else {
                return;
            };
            self.dispatch_state(event, message.retained).await;
        })
    }

    fn handle_result_message(self: Arc<Self>, message: BusMessage) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            waiter::handle_result_payload(self.store.as_ref(), &self.hub, &message.payload).await;
        })
    }

    /// Routes one decoded state event through the trigger index and the
    /// cooldown gate. Candidates fire independently.
    async fn dispatch_state(&self, event: StateEvent, retained: bool) {
        let snapshot = self.current_snapshot();
        let now = Utc::now();

        for candidate in snapshot.device_candidates(&event.device_id) {
            if retained && candidate.config.ignore_retained {
                continue;
            }
            if !candidate.config.matches_state(&event.state) {
                continue;
            }

            let key = CooldownKey::new(candidate.workflow_id, &candidate.trigger_node_id);
            if !self.cooldowns.admit(&key, candidate.config.cooldown_sec, now) {
                tracing::debug!(
                    workflow_id = %candidate.workflow_id,
                    trigger_node_id = %candidate.trigger_node_id,
                    device_id = %event.device_id,
                    "trigger firing suppressed by cooldown"
                );
                continue;
            }

            let trigger_event = TriggerEvent::State {
                trigger_node_id: candidate.trigger_node_id.clone(),
                device_id: event.device_id.clone(),
                state: event.state.clone(),
                ts: event.ts,
                retained,
            };
            if let Err(e) = self
                .start_run(candidate.workflow_id, &candidate.trigger_node_id, trigger_event)
                .await
            {
                tracing::warn!(
                    workflow_id = %candidate.workflow_id,
                    trigger_node_id = %candidate.trigger_node_id,
                    error = %e,
                    "failed to start run for state trigger"
                );
            }
        }
    }

    async fn dispatch_cron_fire(
        &self,
        fire: CronFire,
    ) -> Result<Option<WorkflowRunId>, StartRunError> {
        let key = CooldownKey::new(fire.workflow_id, &fire.trigger_node_id);
        if !self.cooldowns.admit(&key, fire.cooldown_sec, Utc::now()) {
            tracing::debug!(
                workflow_id = %fire.workflow_id,
                trigger_node_id = %fire.trigger_node_id,
                "schedule firing suppressed by cooldown"
            );
            return Ok(None);
        }

        let event = TriggerEvent::Schedule {
            trigger_node_id: fire.trigger_node_id.clone(),
            cron: fire.cron.clone(),
            ts: Utc::now().timestamp_millis(),
        };
        let run_id = self
            .start_run(fire.workflow_id, &fire.trigger_node_id, event)
            .await?;
        Ok(Some(run_id))
    }

    fn spawn_cron_dispatcher(
        engine: &Arc<Self>,
        mut fires: mpsc::Receiver<CronFire>,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(engine);
        tokio::spawn(async move {
            while let Some(fire) = fires.recv().await {
                let Some(engine) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = engine.dispatch_cron_fire(fire).await {
                    tracing::warn!(error = %e, "failed to start scheduled run");
                }
            }
        })
    }

    fn spawn_reload_loop(engine: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(engine);
        let interval = engine.config.reload_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The initial load happened in bootstrap().
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(engine) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = engine.reload().await {
                    tracing::warn!(error = %e, "catalog reload failed, keeping previous snapshot");
                }
            }
        })
    }

    fn spawn_pruner(engine: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(engine);
        let interval = engine.config.prune_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(engine) = weak.upgrade() else {
                    break;
                };
                waiter::prune_expired(engine.store.as_ref(), &engine.hub).await;
            }
        })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        for task in self.tasks.lock().expect("tasks lock").drain(..) {
            task.abort();
        }
    }
}
