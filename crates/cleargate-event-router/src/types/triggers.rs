//! Trigger-level types: how an event payload maps onto workflow inputs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a trigger's workflow inputs are read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum InputSource {
    /// Inputs are read from the payload root.
    #[default]
    Payload,
    /// The payload is an envelope; inputs live under `field`.
    Envelope { field: String },
}

impl InputSource {
    /// Unwrap the data that inputs are projected from. A missing or
    /// non-object envelope field yields `Value::Null`.
    pub fn unwrap<'a>(&self, payload: &'a Value) -> &'a Value {
        match self {
            Self::Payload => payload,
            Self::Envelope { field } => payload.get(field).unwrap_or(&Value::Null),
        }
    }
}
