//! Workflow definition parsing, validation, and indexing.
//!
//! A definition is the serialized graph stored with each workflow: an
//! ordered set of nodes and an ordered set of directed edges. Parsing
//! validates the whole graph; a workflow whose definition fails validation
//! stays in the catalog but is excluded from the trigger index and the
//! scheduler until edited.

use crate::edge::EdgeDef;
use crate::error::DefinitionError;
use crate::node::{
    DeviceStateTriggerConfig, ForConfig, IfConfig, ManualTriggerConfig, Node, NodeConfig,
    NodeKind, NotifyEmailConfig, ScheduleTriggerConfig, SendCommandConfig, SleepConfig,
};
use petgraph::graph::DiGraph;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Serialized node shape.
#[derive(Debug, Deserialize)]
struct RawNode {
    id: String,
    kind: String,
    #[serde(default)]
    data: JsonValue,
}

/// Serialized definition shape.
#[derive(Debug, Deserialize)]
struct RawDefinition {
    #[serde(default)]
    nodes: Vec<RawNode>,
    #[serde(default)]
    edges: Vec<EdgeDef>,
}

/// A parsed and validated workflow definition.
///
/// Nodes and edges keep their authored order; outgoing edges are indexed
/// per node in that order, which is what gives `logic.if` and `logic.for`
/// their positional then/else and body/after semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    nodes: Vec<Node>,
    edges: Vec<EdgeDef>,
    index: HashMap<String, usize>,
    adjacency: Vec<Vec<usize>>,
}

impl Definition {
    /// Parses and validates a serialized definition.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] when the definition is malformed, has
    /// no nodes, contains duplicate node ids, references missing edge
    /// endpoints, uses an unknown node kind, carries per-kind data that does
    /// not match its kind's shape, or contains a cycle.
    pub fn parse(value: &JsonValue) -> Result<Self, DefinitionError> {
        let raw: RawDefinition = serde_json::from_value(value.clone())
            .map_err(|e| DefinitionError::Malformed {
                reason: e.to_string(),
            })?;

        if raw.nodes.is_empty() {
            return Err(DefinitionError::Empty);
        }

        let mut nodes = Vec::with_capacity(raw.nodes.len());
        let mut index = HashMap::with_capacity(raw.nodes.len());
        for raw_node in raw.nodes {
            if index.contains_key(&raw_node.id) {
                return Err(DefinitionError::DuplicateNodeId {
                    node_id: raw_node.id,
                });
            }

            let kind: NodeKind =
                raw_node
                    .kind
                    .parse()
                    .map_err(|()| DefinitionError::UnknownNodeKind {
                        node_id: raw_node.id.clone(),
                        kind: raw_node.kind.clone(),
                    })?;

            let config = parse_config(&raw_node.id, kind, &raw_node.data)?;
            index.insert(raw_node.id.clone(), nodes.len());
            nodes.push(Node {
                id: raw_node.id,
                kind,
                data: raw_node.data,
                config,
            });
        }

        let mut adjacency = vec![Vec::new(); nodes.len()];
        for edge in &raw.edges {
            let Some(&from) = index.get(&edge.from) else {
                return Err(DefinitionError::EdgeEndpointMissing {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    missing: edge.from.clone(),
                });
            };
            let Some(&to) = index.get(&edge.to) else {
                return Err(DefinitionError::EdgeEndpointMissing {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    missing: edge.to.clone(),
                });
            };
            adjacency[from].push(to);
        }

        let definition = Self {
            nodes,
            edges: raw.edges,
            index,
            adjacency,
        };

        if definition.is_cyclic() {
            return Err(DefinitionError::CycleDetected);
        }

        Ok(definition)
    }

    /// Cycle check over the edge set.
    fn is_cyclic(&self) -> bool {
        let mut graph: DiGraph<(), ()> = DiGraph::new();
        let indices: Vec<_> = self.nodes.iter().map(|_| graph.add_node(())).collect();
        for (from, targets) in self.adjacency.iter().enumerate() {
            for &to in targets {
                graph.add_edge(indices[from], indices[to], ());
            }
        }
        petgraph::algo::is_cyclic_directed(&graph)
    }

    /// Returns all nodes in authored order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns all edges in authored order.
    #[must_use]
    pub fn edges(&self) -> &[EdgeDef] {
        &self.edges
    }

    /// Returns a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Returns the out-neighbors of a node in edge definition order.
    ///
    /// An unknown node id yields no successors.
    pub fn successors(&self, id: &str) -> impl Iterator<Item = &Node> {
        let targets = self
            .index
            .get(id)
            .map(|&i| self.adjacency[i].as_slice())
            .unwrap_or_default();
        targets.iter().map(|&i| &self.nodes[i])
    }

    /// Returns the positional out-neighbor of a node, if present.
    #[must_use]
    pub fn successor_at(&self, id: &str, position: usize) -> Option<&Node> {
        let &i = self.index.get(id)?;
        self.adjacency[i].get(position).map(|&t| &self.nodes[t])
    }

    /// Returns all trigger nodes in authored order.
    pub fn triggers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_trigger())
    }
}

/// Parses a node's `data` payload into its typed configuration.
fn parse_config(
    node_id: &str,
    kind: NodeKind,
    data: &JsonValue,
) -> Result<NodeConfig, DefinitionError> {
    // A missing payload is treated as an empty object so kinds whose fields
    // all default remain valid.
    let data = if data.is_null() {
        JsonValue::Object(serde_json::Map::new())
    } else {
        data.clone()
    };

    let invalid = |reason: String| DefinitionError::InvalidNodeData {
        node_id: node_id.to_string(),
        reason,
    };

    let config = match kind {
        NodeKind::ManualTrigger => {
            let config: ManualTriggerConfig =
                serde_json::from_value(data).map_err(|e| invalid(e.to_string()))?;
            NodeConfig::ManualTrigger(config)
        }
        NodeKind::ScheduleTrigger => {
            let config: ScheduleTriggerConfig =
                serde_json::from_value(data).map_err(|e| invalid(e.to_string()))?;
            if config.cron.trim().is_empty() {
                return Err(invalid("empty cron expression".to_string()));
            }
            NodeConfig::ScheduleTrigger(config)
        }
        NodeKind::DeviceStateTrigger => {
            let config: DeviceStateTriggerConfig =
                serde_json::from_value(data).map_err(|e| invalid(e.to_string()))?;
            if config.device_id.is_empty() {
                return Err(invalid("empty device id".to_string()));
            }
            NodeConfig::DeviceStateTrigger(config)
        }
        NodeKind::SendCommand => {
            let config: SendCommandConfig =
                serde_json::from_value(data).map_err(|e| invalid(e.to_string()))?;
            NodeConfig::SendCommand(config)
        }
        NodeKind::NotifyEmail => {
            let config: NotifyEmailConfig =
                serde_json::from_value(data).map_err(|e| invalid(e.to_string()))?;
            NodeConfig::NotifyEmail(config)
        }
        NodeKind::Sleep => {
            let config: SleepConfig =
                serde_json::from_value(data).map_err(|e| invalid(e.to_string()))?;
            NodeConfig::Sleep(config)
        }
        NodeKind::If => {
            let config: IfConfig =
                serde_json::from_value(data).map_err(|e| invalid(e.to_string()))?;
            NodeConfig::If(config)
        }
        NodeKind::For => {
            let config: ForConfig =
                serde_json::from_value(data).map_err(|e| invalid(e.to_string()))?;
            NodeConfig::For(config)
        }
    };

    Ok(config)
}
