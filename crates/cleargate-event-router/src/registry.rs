//! Trigger registry: the catalog of event types the router accepts.
//!
//! Populated once at startup through [`TriggerRegistryBuilder`] and
//! immutable afterwards, so reads need no locking. Cheaply cloneable.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use crate::errors::RegistryError;
use crate::schema::{FieldSchema, FieldType, ObjectSchema, PayloadSchema};
use crate::types::InputSource;

/// Prefix under which payload properties appear in filter expressions.
pub const EVENT_PREFIX: &str = "event.";

/// A registered trigger type.
#[derive(Debug, Clone)]
pub struct TriggerDefinition {
    /// Dotted identifier, e.g. `workflow.error`.
    pub id: String,
    pub description: Option<String>,
    /// Payload schema. Triggers without one accept any payload but cannot
    /// be subscribed to with a filter.
    pub event_schema: Option<Arc<dyn PayloadSchema>>,
    pub input_source: InputSource,
}

impl TriggerDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            event_schema: None,
            input_source: InputSource::Payload,
        }
    }

    pub fn with_schema(mut self, schema: impl PayloadSchema + 'static) -> Self {
        self.event_schema = Some(Arc::new(schema));
        self
    }

    pub fn with_input_source(mut self, source: InputSource) -> Self {
        self.input_source = source;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Read-only trigger catalog.
#[derive(Debug, Clone, Default)]
pub struct TriggerRegistry {
    triggers: Arc<BTreeMap<String, TriggerDefinition>>,
}

impl TriggerRegistry {
    pub fn builder() -> TriggerRegistryBuilder {
        TriggerRegistryBuilder::default()
    }

    /// Build a registry from definitions, failing on the first duplicate id.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = TriggerDefinition>,
    ) -> Result<Self, RegistryError> {
        let mut builder = Self::builder();
        for def in definitions {
            builder.register(def)?;
        }
        Ok(builder.build())
    }

    pub fn get(&self, id: &str) -> Option<&TriggerDefinition> {
        self.triggers.get(id)
    }

    pub fn has(&self, id: &str) -> bool {
        self.triggers.contains_key(id)
    }

    /// All definitions, ordered by id.
    pub fn list(&self) -> Vec<&TriggerDefinition> {
        self.triggers.values().collect()
    }

    /// `event.`-prefixed paths a filter on this trigger may reference.
    /// `None` if the trigger is unknown or has no schema.
    pub fn filter_paths(&self, id: &str) -> Option<Vec<String>> {
        let schema = self.get(id)?.event_schema.as_ref()?;
        Some(
            schema
                .paths()
                .into_iter()
                .map(|p| format!("{EVENT_PREFIX}{p}"))
                .collect(),
        )
    }
}

/// Collects trigger definitions before the registry is frozen.
#[derive(Debug, Default)]
pub struct TriggerRegistryBuilder {
    triggers: BTreeMap<String, TriggerDefinition>,
}

impl TriggerRegistryBuilder {
    /// Add a definition. Registering the same id twice is a startup error.
    pub fn register(&mut self, definition: TriggerDefinition) -> Result<(), RegistryError> {
        if self.triggers.contains_key(&definition.id) {
            return Err(RegistryError::DuplicateTrigger { id: definition.id });
        }
        tracing::debug!(trigger_type = %definition.id, "trigger registered");
        self.triggers.insert(definition.id.clone(), definition);
        Ok(())
    }

    pub fn build(self) -> TriggerRegistry {
        TriggerRegistry {
            triggers: Arc::new(self.triggers),
        }
    }
}

/// Trigger types every deployment registers.
///
/// - `workflow.error`: a workflow run failed.
/// - `external.event`: an envelope from an outside system; workflow inputs
///   are read from its `payload` field.
pub fn builtin_triggers() -> Vec<TriggerDefinition> {
    let workflow_error = ObjectSchema::new()
        .field("workflow_id", FieldSchema::string().required())
        .field("workflow_name", FieldSchema::string())
        .field("execution_id", FieldSchema::string().required())
        .field(
            "error",
            FieldSchema::object(
                ObjectSchema::new()
                    .field("message", FieldSchema::string().required())
                    .field("step_id", FieldSchema::string())
                    .field("type", FieldSchema::string()),
            )
            .required(),
        )
        .field(
            "severity",
            FieldSchema::string().one_of([json!("warning"), json!("error"), json!("critical")]),
        );

    let external_event = ObjectSchema::new()
        .field("source", FieldSchema::string().required())
        .field("event_type", FieldSchema::string().required())
        .field("received_at", FieldSchema::string())
        .field("headers", FieldSchema::object(ObjectSchema::new().open()))
        .field("payload", FieldSchema::of(FieldType::Any));

    vec![
        TriggerDefinition::new("workflow.error")
            .describe("A workflow execution failed")
            .with_schema(workflow_error),
        TriggerDefinition::new("external.event")
            .describe("An event delivered by an external system")
            .with_schema(external_event)
            .with_input_source(InputSource::Envelope {
                field: "payload".into(),
            }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn demo() -> TriggerDefinition {
        TriggerDefinition::new("demo.event")
            .with_schema(ObjectSchema::new().field("a", FieldSchema::string().required()))
    }

    #[test]
    fn duplicate_registration_fails_fast() {
        let err = TriggerRegistry::from_definitions([demo(), demo()]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateTrigger { id } if id == "demo.event"));
    }

    #[test]
    fn lookup_and_listing() {
        let reg = TriggerRegistry::from_definitions(builtin_triggers().into_iter().chain([demo()]))
            .unwrap();
        assert!(reg.has("demo.event"));
        assert!(!reg.has("nope"));
        let ids: Vec<_> = reg.list().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["demo.event", "external.event", "workflow.error"]);
        assert_eq!(
            reg.get("external.event").unwrap().input_source,
            InputSource::Envelope {
                field: "payload".into()
            }
        );
    }

    #[test]
    fn filter_paths_are_event_prefixed() {
        let reg = TriggerRegistry::from_definitions([demo(), TriggerDefinition::new("bare")])
            .unwrap();
        assert_eq!(reg.filter_paths("demo.event").unwrap(), vec!["event.a"]);
        assert!(reg.filter_paths("bare").is_none());
        assert!(reg.filter_paths("missing").is_none());
    }

    #[test]
    fn builtin_schemas_validate() {
        let reg = TriggerRegistry::from_definitions(builtin_triggers()).unwrap();
        let schema = reg.get("workflow.error").unwrap().event_schema.clone().unwrap();
        assert!(schema
            .validate(&json!({
                "workflow_id": "w",
                "execution_id": "x",
                "error": {"message": "boom"}
            }))
            .is_ok());
        assert!(schema.validate(&json!({"workflow_id": "w"})).is_err());

        let ext = reg.get("external.event").unwrap().event_schema.clone().unwrap();
        assert!(ext
            .validate(&json!({"source": "github", "event_type": "push", "payload": {"ref": "main"}}))
            .is_ok());
        assert_eq!(ext.resolve_path("payload.anything"), Some(FieldType::Any));
    }
}
