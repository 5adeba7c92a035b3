//! Workflow definitions as seen by the router.
//!
//! Workflows are owned by an external store; the router only reads them to
//! decide whether a dispatch target is usable and which inputs it declares.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a workflow input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    String,
    Number,
    Boolean,
    Choice,
    Array,
    Object,
}

/// A single declared workflow input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkflowInput {
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: InputType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Allowed values for `choice` inputs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,
}

/// The parsed definition of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<WorkflowInput>,
    /// Steps and anything else the execution engine needs. Opaque here.
    #[serde(default)]
    pub steps: Value,
}

/// A stored workflow, including the flags that decide dispatchability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkflowRecord {
    pub id: String,
    pub space_id: String,
    pub name: String,
    pub enabled: bool,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<WorkflowDefinition>,
}

impl WorkflowRecord {
    /// Convert into an execution model if the workflow can be dispatched:
    /// not soft-deleted, enabled, valid, and carrying a definition.
    pub fn into_execution_model(self) -> Option<WorkflowExecutionModel> {
        if self.deleted_at.is_some() || !self.enabled || !self.valid {
            return None;
        }
        let definition = self.definition?;
        Some(WorkflowExecutionModel {
            id: self.id,
            space_id: self.space_id,
            name: self.name,
            enabled: self.enabled,
            definition,
        })
    }
}

/// What the execution engine receives for a dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkflowExecutionModel {
    pub id: String,
    pub space_id: String,
    pub name: String,
    pub enabled: bool,
    pub definition: WorkflowDefinition,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> WorkflowRecord {
        WorkflowRecord {
            id: "w1".into(),
            space_id: "s1".into(),
            name: "W".into(),
            enabled: true,
            valid: true,
            deleted_at: None,
            definition: Some(WorkflowDefinition {
                name: "W".into(),
                inputs: vec![],
                steps: Value::Null,
            }),
        }
    }

    #[test]
    fn dispatchable_record_converts() {
        assert!(record().into_execution_model().is_some());
    }

    #[test]
    fn unusable_records_are_unavailable() {
        let mut disabled = record();
        disabled.enabled = false;
        let mut invalid = record();
        invalid.valid = false;
        let mut deleted = record();
        deleted.deleted_at = Some(Utc::now());
        let mut empty = record();
        empty.definition = None;
        for r in [disabled, invalid, deleted, empty] {
            assert!(r.into_execution_model().is_none());
        }
    }

    #[test]
    fn input_deserializes_type_field() {
        let input: WorkflowInput = serde_json::from_value(serde_json::json!({
            "name": "env",
            "type": "choice",
            "required": true,
            "options": ["prod", "staging"]
        }))
        .unwrap();
        assert_eq!(input.input_type, InputType::Choice);
        assert_eq!(input.options.len(), 2);
        assert!(input.default.is_none());
    }
}
