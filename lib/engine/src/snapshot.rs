//! The engine's read-derived view of the workflow catalog.
//!
//! A snapshot is built off-lock from a catalog listing and swapped in
//! atomically, so trigger dispatch never waits on the reload loop for longer
//! than the swap. Workflows that are disabled or fail definition validation
//! are logged and excluded; they stay in the catalog and may become eligible
//! after a later edit.

use homeflow_core::WorkflowId;
use homeflow_workflow::{Definition, DeviceStateTriggerConfig, NodeConfig, Workflow};
use std::collections::HashMap;
use std::sync::Arc;

/// An enabled workflow with a validated definition.
#[derive(Debug, Clone)]
pub struct EligibleWorkflow {
    /// The workflow id.
    pub id: WorkflowId,
    /// The workflow name, for logging.
    pub name: String,
    /// The validated definition.
    pub definition: Arc<Definition>,
}

/// One device-state trigger candidate in the dispatch index.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    /// The candidate workflow.
    pub workflow_id: WorkflowId,
    /// The trigger node within the workflow.
    pub trigger_node_id: String,
    /// The trigger's predicate and gating configuration.
    pub config: DeviceStateTriggerConfig,
}

/// One schedule trigger the cron reconciler should materialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// The workflow.
    pub workflow_id: WorkflowId,
    /// The trigger node within the workflow.
    pub trigger_node_id: String,
    /// The six-field cron expression.
    pub cron: String,
    /// Cooldown for the gate, from the trigger config.
    pub cooldown_sec: i64,
}

/// An immutable snapshot of the eligible catalog with its trigger indices.
#[derive(Debug, Default)]
pub struct Snapshot {
    workflows: HashMap<WorkflowId, EligibleWorkflow>,
    device_index: HashMap<String, Vec<DeviceCandidate>>,
    schedule_entries: Vec<ScheduleEntry>,
}

impl Snapshot {
    /// Builds a snapshot from a catalog listing.
    ///
    /// Candidates for one device keep the per-workflow definition order of
    /// their trigger nodes; workflow order is not guaranteed.
    #[must_use]
    pub fn build(catalog: &[Workflow]) -> Self {
        let mut workflows = HashMap::new();
        let mut device_index: HashMap<String, Vec<DeviceCandidate>> = HashMap::new();
        let mut schedule_entries = Vec::new();

        for workflow in catalog {
            if !workflow.enabled {
                continue;
            }

            let definition = match workflow.parse_definition() {
                Ok(definition) => Arc::new(definition),
                Err(e) => {
                    tracing::warn!(
                        workflow_id = %workflow.id,
                        name = %workflow.name,
                        error = %e,
                        "excluding workflow with invalid definition"
                    );
                    continue;
                }
            };

            for node in definition.triggers() {
                match &node.config {
                    NodeConfig::DeviceStateTrigger(config) => {
                        device_index
                            .entry(config.device_id.clone())
                            .or_default()
                            .push(DeviceCandidate {
                                workflow_id: workflow.id,
                                trigger_node_id: node.id.clone(),
                                config: config.clone(),
                            });
                    }
                    NodeConfig::ScheduleTrigger(config) => {
                        schedule_entries.push(ScheduleEntry {
                            workflow_id: workflow.id,
                            trigger_node_id: node.id.clone(),
                            cron: config.cron.clone(),
                            cooldown_sec: config.cooldown_sec,
                        });
                    }
                    _ => {}
                }
            }

            workflows.insert(
                workflow.id,
                EligibleWorkflow {
                    id: workflow.id,
                    name: workflow.name.clone(),
                    definition,
                },
            );
        }

        Self {
            workflows,
            device_index,
            schedule_entries,
        }
    }

    /// Looks up an eligible workflow.
    #[must_use]
    pub fn workflow(&self, id: WorkflowId) -> Option<&EligibleWorkflow> {
        self.workflows.get(&id)
    }

    /// Returns the trigger candidates for a device's state events.
    #[must_use]
    pub fn device_candidates(&self, device_id: &str) -> &[DeviceCandidate] {
        self.device_index
            .get(device_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the schedule entries the cron reconciler should materialize.
    #[must_use]
    pub fn schedule_entries(&self) -> &[ScheduleEntry] {
        &self.schedule_entries
    }

    /// Iterates over every device-state trigger candidate in the index.
    pub fn device_candidates_all(&self) -> impl Iterator<Item = &DeviceCandidate> {
        self.device_index.values().flatten()
    }

    /// Number of eligible workflows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    /// True when no workflow is eligible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device_workflow(device_id: &str) -> Workflow {
        Workflow::new(
            "device workflow",
            json!({
                "nodes": [
                    {"id": "t1", "kind": "trigger.device_state",
                     "data": {"device_id": device_id, "key": "motion", "op": "eq", "value": true}},
                    {"id": "a1", "kind": "logic.sleep", "data": {}},
                ],
                "edges": [{"from": "t1", "to": "a1"}],
            }),
        )
    }

    #[test]
    fn indexes_device_triggers() {
        let catalog = vec![device_workflow("d1"), device_workflow("d2")];
        let snapshot = Snapshot::build(&catalog);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.device_candidates("d1").len(), 1);
        assert_eq!(snapshot.device_candidates("d2").len(), 1);
        assert!(snapshot.device_candidates("other").is_empty());
    }

    #[test]
    fn disabled_workflows_are_excluded() {
        let mut workflow = device_workflow("d1");
        workflow.enabled = false;
        let snapshot = Snapshot::build(&[workflow]);

        assert!(snapshot.is_empty());
        assert!(snapshot.device_candidates("d1").is_empty());
    }

    #[test]
    fn invalid_definitions_are_excluded() {
        let workflow = Workflow::new("broken", json!({"nodes": [], "edges": []}));
        let snapshot = Snapshot::build(&[workflow]);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn collects_schedule_entries() {
        let workflow = Workflow::new(
            "nightly",
            json!({
                "nodes": [
                    {"id": "s1", "kind": "trigger.schedule",
                     "data": {"cron": "0 0 3 * * *", "cooldown_sec": 60}},
                    {"id": "a1", "kind": "logic.sleep", "data": {}},
                ],
                "edges": [{"from": "s1", "to": "a1"}],
            }),
        );
        let snapshot = Snapshot::build(&[workflow.clone()]);

        let entries = snapshot.schedule_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].workflow_id, workflow.id);
        assert_eq!(entries[0].trigger_node_id, "s1");
        assert_eq!(entries[0].cron, "0 0 3 * * *");
        assert_eq!(entries[0].cooldown_sec, 60);
    }

    #[test]
    fn candidates_keep_definition_order() {
        let workflow = Workflow::new(
            "two triggers",
            json!({
                "nodes": [
                    {"id": "first", "kind": "trigger.device_state", "data": {"device_id": "d1"}},
                    {"id": "second", "kind": "trigger.device_state", "data": {"device_id": "d1"}},
                    {"id": "a1", "kind": "logic.sleep", "data": {}},
                ],
                "edges": [
                    {"from": "first", "to": "a1"},
                    {"from": "second", "to": "a1"},
                ],
            }),
        );
        let snapshot = Snapshot::build(&[workflow]);

        let ids: Vec<_> = snapshot
            .device_candidates("d1")
            .iter()
            .map(|c| c.trigger_node_id.as_str())
            .collect();
        assert_eq!(ids, vec!["first", "second"]);
    }
}
