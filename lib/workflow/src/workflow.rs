//! Workflow catalog records.

use crate::definition::Definition;
use crate::error::DefinitionError;
use chrono::{DateTime, Utc};
use homeflow_core::{UserId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A workflow as persisted in the catalog.
///
/// The store owns these records; the engine holds a read-derived snapshot
/// refreshed periodically and on demand. A workflow is *eligible* for
/// triggering iff it is enabled and its definition parses and validates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier for this workflow.
    pub id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// Whether the workflow may be triggered.
    pub enabled: bool,
    /// The serialized definition graph.
    pub definition: JsonValue,
    /// The user who created the workflow, when known.
    pub created_by: Option<UserId>,
    /// When this workflow was created.
    pub created_at: DateTime<Utc>,
    /// When this workflow was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Creates a new enabled workflow with the given definition.
    #[must_use]
    pub fn new(name: impl Into<String>, definition: JsonValue) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            name: name.into(),
            enabled: true,
            definition,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Parses and validates this workflow's definition.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] when the definition is invalid; such a
    /// workflow is excluded from the trigger index and the scheduler.
    pub fn parse_definition(&self) -> Result<Definition, DefinitionError> {
        Definition::parse(&self.definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn workflow_creation() {
        let workflow = Workflow::new(
            "Hallway light",
            json!({"nodes": [{"id": "t1", "kind": "trigger.manual"}], "edges": []}),
        );
        assert!(workflow.enabled);
        assert!(workflow.parse_definition().is_ok());
    }

    #[test]
    fn invalid_definition_surfaces_error() {
        let workflow = Workflow::new("Broken", json!({"nodes": [], "edges": []}));
        assert!(workflow.parse_definition().is_err());
    }
}
