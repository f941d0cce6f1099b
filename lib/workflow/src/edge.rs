//! Edge types for workflow definitions.
//!
//! Edges are directed and identified purely by their endpoint node ids.
//! Their order within the definition is significant: `logic.if` and
//! `logic.for` interpret their outgoing edges positionally.

use serde::{Deserialize, Serialize};

/// A directed edge between two nodes in a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDef {
    /// Source node id.
    pub from: String,
    /// Target node id.
    pub to: String,
}

impl EdgeDef {
    /// Creates a new edge.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_serde_roundtrip() {
        let edge = EdgeDef::new("t1", "a1");
        let json = serde_json::to_string(&edge).expect("serialize");
        let parsed: EdgeDef = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(edge, parsed);
    }
}
