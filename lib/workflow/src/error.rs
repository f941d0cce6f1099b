//! Error types for the workflow definition model.

use std::fmt;

/// Errors from parsing or validating a workflow definition.
///
/// Any of these renders the workflow ineligible for triggering; the workflow
/// itself stays in the catalog and may become eligible after a later edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// The serialized definition is not a well-formed definition object.
    Malformed { reason: String },
    /// The definition contains no nodes.
    Empty,
    /// Two nodes share the same id.
    DuplicateNodeId { node_id: String },
    /// A node's `kind` is not one of the recognized kinds.
    UnknownNodeKind { node_id: String, kind: String },
    /// An edge references a node id that is not present in the definition.
    EdgeEndpointMissing { from: String, to: String, missing: String },
    /// A node's `data` payload does not match the shape its kind requires.
    InvalidNodeData { node_id: String, reason: String },
    /// The edges form a cycle.
    CycleDetected,
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { reason } => write!(f, "malformed definition: {reason}"),
            Self::Empty => write!(f, "definition has no nodes"),
            Self::DuplicateNodeId { node_id } => {
                write!(f, "duplicate node id '{node_id}'")
            }
            Self::UnknownNodeKind { node_id, kind } => {
                write!(f, "node '{node_id}' has unknown kind '{kind}'")
            }
            Self::EdgeEndpointMissing { from, to, missing } => {
                write!(f, "edge {from} -> {to} references missing node '{missing}'")
            }
            Self::InvalidNodeData { node_id, reason } => {
                write!(f, "node '{node_id}' has invalid data: {reason}")
            }
            Self::CycleDetected => write!(f, "definition edges form a cycle"),
        }
    }
}

impl std::error::Error for DefinitionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_error_display() {
        let err = DefinitionError::UnknownNodeKind {
            node_id: "n1".to_string(),
            kind: "logic.while".to_string(),
        };
        assert!(err.to_string().contains("unknown kind 'logic.while'"));

        let err = DefinitionError::EdgeEndpointMissing {
            from: "a".to_string(),
            to: "b".to_string(),
            missing: "b".to_string(),
        };
        assert!(err.to_string().contains("missing node 'b'"));
    }
}
