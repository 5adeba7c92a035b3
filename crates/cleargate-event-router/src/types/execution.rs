//! What the router hands to the execution engine.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::event::Event;

/// A credential that lets the execution engine act as the emitting
/// principal. The secret is redacted from `Debug` and never serialized.
#[derive(Clone)]
pub struct ExecutionCredential {
    pub id: String,
    pub principal_id: String,
    pub secret: SecretString,
}

impl std::fmt::Debug for ExecutionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionCredential")
            .field("id", &self.id)
            .field("principal_id", &self.principal_id)
            .finish_non_exhaustive()
    }
}

/// An [`ExecutionCredential`] at rest: the secret is sealed and base64
/// encoded, safe to hand to a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SealedCredential {
    pub id: String,
    pub principal_id: String,
    pub sealed_secret: String,
}

/// Provenance of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TriggeredBy {
    pub trigger_type: String,
    pub event_id: String,
    pub subscription_id: String,
    pub principal_id: String,
}

/// The slice of the source event carried into an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EventSnapshot {
    pub id: String,
    pub trigger_type: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl From<&Event> for EventSnapshot {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            trigger_type: event.trigger_type.clone(),
            payload: event.payload.clone(),
            timestamp: event.timestamp,
        }
    }
}

/// Everything an execution needs besides the workflow itself.
///
/// When the projected inputs failed validation, `input_validation_failed`
/// is set and the engine is expected to record a failed run immediately
/// instead of executing any step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionContext {
    pub space_id: String,
    pub triggered_by: TriggeredBy,
    pub inputs: Map<String, Value>,
    pub event: EventSnapshot,
    #[serde(skip)]
    pub credential: Option<ExecutionCredential>,
    pub input_validation_failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_validation_error: Option<String>,
}

/// What the execution engine reports back for a dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionOutcome {
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}
