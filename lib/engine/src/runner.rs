//! Asynchronous graph traversal for a single run.
//!
//! Traversal is depth-first with an explicit frame stack, preserving edge
//! order at every branch point. Each run executes sequentially within its
//! own detached task; concurrency happens across runs, not inside one.
//!
//! A run either drains its stack (`success`), stops at the first node error
//! (`failed`), or suspends when an `action.send_command` node waits for its
//! result. A suspended run publishes `run_waiting` and hands its terminal
//! state to the correlation waiter; traversal never resumes past the
//! suspension point.

use crate::error::RunError;
use crate::event::RunEvent;
use crate::hub::RunEventHub;
use crate::mailer::{DEFAULT_RECIPIENT_NAME, Mailer};
use crate::snapshot::EligibleWorkflow;
use chrono::{Duration as ChronoDuration, Utc};
use homeflow_bus::{CommandEnvelope, MessageBus};
use homeflow_core::WorkflowRunId;
use homeflow_store::WorkflowStore;
use homeflow_workflow::{
    Definition, Node, NodeConfig, NotifyEmailConfig, PendingCorrelation, RunStatus, RunStep,
    SendCommandConfig, StepStatus,
};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Shared collaborators for run execution.
pub(crate) struct RunContext {
    pub store: Arc<dyn WorkflowStore>,
    pub bus: Arc<dyn MessageBus>,
    pub mailer: Arc<dyn Mailer>,
    pub hub: Arc<RunEventHub>,
    /// Topic namespace for device traffic.
    pub namespace: String,
    /// Correlation lifetime when a node does not specify one.
    pub default_result_timeout_sec: i64,
}

/// How a traversal ended.
enum Traversal {
    /// The stack drained; the run succeeded.
    Completed,
    /// The run suspended awaiting a command result.
    Suspended,
}

/// A traversal frame.
enum Frame {
    /// Visit a node.
    Visit(String),
    /// Resume a `logic.for` node with `remaining` body iterations left.
    ForIter { node_id: String, remaining: u64 },
}

/// What a node execution asks the traversal to do next.
enum NodeOutcome {
    /// Follow all outgoing edges in order.
    Continue,
    /// Follow exactly one target (or none, ending the branch).
    Goto(Option<String>),
    /// Begin `logic.for` iterations.
    Loop(u64),
    /// Suspend the run after recording the pending correlation.
    Suspend(PendingCorrelation),
}

/// Executes a run to its terminal state (or suspension) and settles the
/// run record and events accordingly.
pub(crate) async fn drive(
    ctx: Arc<RunContext>,
    workflow: EligibleWorkflow,
    run_id: WorkflowRunId,
    start_nodes: Vec<String>,
    trigger_event: JsonValue,
) {
    match traverse(&ctx, &workflow, run_id, start_nodes, &trigger_event).await {
        Ok(Traversal::Completed) => {
            if let Err(e) = ctx.store.finish_run(run_id, RunStatus::Success, None).await {
                tracing::warn!(run_id = %run_id, error = %e, "failed to persist run success");
            }
            ctx.hub
                .publish(RunEvent::run_finished(run_id, workflow.id, "success", None));
        }
        Ok(Traversal::Suspended) => {
            // The correlation waiter or the pruner finishes the run.
        }
        Err(error) => {
            let text = error.to_string();
            tracing::warn!(run_id = %run_id, workflow_id = %workflow.id, error = %text, "run failed");
            if let Err(e) = ctx
                .store
                .finish_run(run_id, RunStatus::Failed, Some(&text))
                .await
            {
                tracing::warn!(run_id = %run_id, error = %e, "failed to persist run failure");
            }
            ctx.hub
                .publish(RunEvent::run_finished(run_id, workflow.id, "failed", Some(text)));
        }
    }
}

async fn traverse(
    ctx: &RunContext,
    workflow: &EligibleWorkflow,
    run_id: WorkflowRunId,
    start_nodes: Vec<String>,
    trigger_event: &JsonValue,
) -> Result<Traversal, RunError> {
    let definition = workflow.definition.as_ref();
    let mut stack: Vec<Frame> = start_nodes.into_iter().rev().map(Frame::Visit).collect();

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::ForIter { node_id, remaining } => {
                if remaining > 0 {
                    stack.push(Frame::ForIter {
                        node_id: node_id.clone(),
                        remaining: remaining - 1,
                    });
                    if let Some(body) = definition.successor_at(&node_id, 0) {
                        stack.push(Frame::Visit(body.id.clone()));
                    }
                } else if let Some(after) = definition.successor_at(&node_id, 1) {
                    stack.push(Frame::Visit(after.id.clone()));
                }
            }
            Frame::Visit(node_id) => {
                let Some(node) = definition.node(&node_id) else {
                    // Validated definitions resolve every edge target.
                    continue;
                };

                if node.is_trigger() {
                    // Mid-graph trigger, legal only via user error: pass
                    // through all outgoing edges without a step.
                    ctx.hub.publish(RunEvent::node_started(
                        run_id,
                        workflow.id,
                        &node.id,
                        node.kind,
                        None,
                    ));
                    ctx.hub.publish(RunEvent::node_finished(
                        run_id,
                        workflow.id,
                        &node.id,
                        node.kind,
                        None,
                        "success",
                        None,
                    ));
                    push_successors(definition, &mut stack, &node.id);
                    continue;
                }

                let step = begin_step(ctx, workflow, run_id, node).await?;
                match execute_node(ctx, workflow, run_id, node, trigger_event).await {
                    Ok(outcome) => {
                        finish_step(ctx, workflow, run_id, node, &step, None).await;
                        match outcome {
                            NodeOutcome::Continue => {
                                push_successors(definition, &mut stack, &node.id);
                            }
                            NodeOutcome::Goto(next) => {
                                if let Some(next) = next {
                                    stack.push(Frame::Visit(next));
                                }
                            }
                            NodeOutcome::Loop(remaining) => {
                                stack.push(Frame::ForIter {
                                    node_id: node.id.clone(),
                                    remaining,
                                });
                            }
                            NodeOutcome::Suspend(pending) => {
                                ctx.store.upsert_pending_correlation(&pending).await?;
                                ctx.store.mark_run_waiting(run_id).await?;
                                ctx.hub.publish(RunEvent::run_waiting(run_id, workflow.id));
                                return Ok(Traversal::Suspended);
                            }
                        }
                    }
                    Err(error) => {
                        finish_step(ctx, workflow, run_id, node, &step, Some(&error)).await;
                        return Err(error);
                    }
                }
            }
        }
    }

    Ok(Traversal::Completed)
}

/// Pushes all out-neighbors so they pop in edge definition order.
fn push_successors(definition: &Definition, stack: &mut Vec<Frame>, node_id: &str) {
    let ids: Vec<String> = definition.successors(node_id).map(|n| n.id.clone()).collect();
    for id in ids.into_iter().rev() {
        stack.push(Frame::Visit(id));
    }
}

/// Persists a running step and publishes `node_started`.
async fn begin_step(
    ctx: &RunContext,
    workflow: &EligibleWorkflow,
    run_id: WorkflowRunId,
    node: &Node,
) -> Result<RunStep, RunError> {
    let step = RunStep::new(run_id, &node.id, node.definition_snapshot());
    ctx.store.create_step(&step).await?;

    let mut event = RunEvent::node_started(run_id, workflow.id, &node.id, node.kind, Some(step.id));
    if let NodeConfig::Sleep(config) = &node.config {
        event = event.with_sleep_duration(config.clamped_secs());
    }
    ctx.hub.publish(event);

    Ok(step)
}

/// Finishes a step and publishes `node_finished`.
///
/// Store errors on step finishes are logged without retry.
async fn finish_step(
    ctx: &RunContext,
    workflow: &EligibleWorkflow,
    run_id: WorkflowRunId,
    node: &Node,
    step: &RunStep,
    error: Option<&RunError>,
) {
    let (status, status_str, error_text) = match error {
        None => (StepStatus::Success, "success", None),
        Some(error) => (StepStatus::Failed, "failed", Some(error.to_string())),
    };

    if let Err(e) = ctx
        .store
        .finish_step(step.id, status, error_text.as_deref())
        .await
    {
        tracing::warn!(run_id = %run_id, step_id = %step.id, error = %e, "failed to persist step finish");
    }

    ctx.hub.publish(RunEvent::node_finished(
        run_id,
        workflow.id,
        &node.id,
        node.kind,
        Some(step.id),
        status_str,
        error_text,
    ));
}

async fn execute_node(
    ctx: &RunContext,
    workflow: &EligibleWorkflow,
    run_id: WorkflowRunId,
    node: &Node,
    trigger_event: &JsonValue,
) -> Result<NodeOutcome, RunError> {
    match &node.config {
        NodeConfig::Sleep(config) => {
            tokio::time::sleep(Duration::from_secs(config.clamped_secs())).await;
            Ok(NodeOutcome::Continue)
        }
        NodeConfig::SendCommand(config) => {
            send_command(ctx, workflow, run_id, node, config).await
        }
        NodeConfig::NotifyEmail(config) => {
            notify_email(ctx, node, config).await?;
            Ok(NodeOutcome::Continue)
        }
        NodeConfig::If(config) => {
            let position = if config.matches_event(trigger_event) { 0 } else { 1 };
            let next = workflow
                .definition
                .successor_at(&node.id, position)
                .map(|n| n.id.clone());
            Ok(NodeOutcome::Goto(next))
        }
        NodeConfig::For(config) => Ok(NodeOutcome::Loop(config.iterations())),
        // Trigger configs are handled before step creation; pass through.
        NodeConfig::ManualTrigger(_)
        | NodeConfig::ScheduleTrigger(_)
        | NodeConfig::DeviceStateTrigger(_) => Ok(NodeOutcome::Continue),
    }
}

async fn send_command(
    ctx: &RunContext,
    workflow: &EligibleWorkflow,
    run_id: WorkflowRunId,
    node: &Node,
    config: &SendCommandConfig,
) -> Result<NodeOutcome, RunError> {
    if config.device_id.is_empty() {
        return Err(RunError::InvalidNode {
            node_id: node.id.clone(),
            reason: "empty device id".to_string(),
        });
    }

    let command = if config.command.trim().is_empty() {
        "set_state"
    } else {
        config.command.as_str()
    };

    let now = Utc::now();
    let now_ms = now.timestamp_millis();
    let corr = format!("{}-{}-{}", workflow.id, node.id, now_ms);

    let envelope = CommandEnvelope::new(
        &config.device_id,
        command,
        config.args.clone(),
        &corr,
        now_ms,
    );
    let payload = envelope
        .to_json_bytes()
        .map_err(|e| RunError::PublishFailed {
            message: e.to_string(),
        })?;
    let topic = format!("{}/device/command/{}", ctx.namespace, config.device_id);
    ctx.bus.publish(&topic, payload, false).await?;

    if !config.wait_for_result {
        return Ok(NodeOutcome::Continue);
    }

    let timeout_sec = if config.result_timeout_sec > 0 {
        config.result_timeout_sec
    } else {
        ctx.default_result_timeout_sec
    };
    Ok(NodeOutcome::Suspend(PendingCorrelation {
        corr,
        run_id,
        workflow_id: workflow.id,
        device_id: config.device_id.clone(),
        created_at: now,
        expires_at: now + ChronoDuration::seconds(timeout_sec),
    }))
}

async fn notify_email(
    ctx: &RunContext,
    node: &Node,
    config: &NotifyEmailConfig,
) -> Result<(), RunError> {
    let invalid = |reason: &str| RunError::InvalidNode {
        node_id: node.id.clone(),
        reason: reason.to_string(),
    };

    if config.subject.trim().is_empty() {
        return Err(invalid("empty subject"));
    }
    if config.message.trim().is_empty() {
        return Err(invalid("empty message"));
    }
    if config.recipients.is_empty() {
        return Err(invalid("no recipients"));
    }

    let mut seen = HashSet::new();
    for recipient in &config.recipients {
        if !seen.insert(recipient.email.as_str()) {
            continue;
        }
        let name = recipient
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_RECIPIENT_NAME);
        ctx.mailer
            .send(&recipient.email, name, &config.subject, &config.message)
            .await
            .map_err(|e| RunError::EmailFailed {
                message: e.to_string(),
            })?;
    }

    Ok(())
}
