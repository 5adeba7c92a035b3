//! Event ingestion: validate, stamp identity, persist.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::EmissionConfig;
use crate::credentials::CredentialBroker;
use crate::errors::EmitError;
use crate::event_store::EventStore;
use crate::registry::TriggerRegistry;
use crate::types::{CredentialRef, Event, EventStatus, Principal};

/// Identity and tenancy of the caller emitting an event.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub space_id: Option<String>,
    /// `None` when no authenticated identity is resolvable.
    pub principal: Option<Principal>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_space(mut self, space_id: impl Into<String>) -> Self {
        self.space_id = Some(space_id.into());
        self
    }

    pub fn as_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }
}

/// Synchronous acknowledgment of an emission. Processing is asynchronous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmitReceipt {
    pub event_id: String,
}

/// Accepts events from trigger sources.
#[derive(Clone)]
pub struct EventEmissionService {
    triggers: TriggerRegistry,
    events: EventStore,
    credentials: CredentialBroker,
    config: EmissionConfig,
}

impl EventEmissionService {
    pub fn new(
        triggers: TriggerRegistry,
        events: EventStore,
        credentials: CredentialBroker,
        config: EmissionConfig,
    ) -> Self {
        Self {
            triggers,
            events,
            credentials,
            config,
        }
    }

    /// Validate `payload` against the trigger's schema and persist it as a
    /// pending event.
    ///
    /// Credential minting is best-effort: a missing capability or a failed
    /// mint is logged and the event is stored without a credential. Only an
    /// unknown trigger, an invalid payload, or a failed write reject the
    /// call, and in those cases nothing is persisted.
    pub async fn emit(
        &self,
        trigger_type: &str,
        payload: Value,
        request: &RequestContext,
    ) -> Result<EmitReceipt, EmitError> {
        let trigger = self
            .triggers
            .get(trigger_type)
            .ok_or_else(|| EmitError::UnknownTrigger {
                trigger_type: trigger_type.to_string(),
            })?;

        if let Some(schema) = &trigger.event_schema {
            schema
                .validate(&payload)
                .map_err(|violations| EmitError::PayloadValidation {
                    trigger_type: trigger_type.to_string(),
                    violations,
                })?;
        }

        let space_id = request
            .space_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.default_space_id.clone());
        let principal = request.principal.clone().unwrap_or_else(Principal::system);
        let event_id = Uuid::new_v4().to_string();

        let minted = if self.config.mint_credentials {
            self.mint(&principal, &space_id, &event_id).await
        } else {
            None
        };

        let event = Event {
            id: event_id.clone(),
            trigger_type: trigger_type.to_string(),
            payload,
            space_id,
            timestamp: Utc::now(),
            status: EventStatus::Pending,
            processing_started_at: None,
            credential_ref: CredentialRef {
                credential_type: principal.credential_type,
                principal_id: principal.id,
                api_key_id: minted.or(principal.api_key_id),
            },
        };
        let space_id = event.space_id.clone();
        self.events.persist(event).await?;

        tracing::info!(
            event_id = %event_id,
            trigger_type = %trigger_type,
            space_id = %space_id,
            "event emitted"
        );
        Ok(EmitReceipt { event_id })
    }

    async fn mint(&self, principal: &Principal, space_id: &str, event_id: &str) -> Option<String> {
        if !self.credentials.can_mint() {
            tracing::debug!(event_id = %event_id, "credential minting unavailable");
            return None;
        }
        match self
            .credentials
            .mint_for_event(principal, space_id, event_id)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(
                    event_id = %event_id,
                    principal_id = %principal.id,
                    error = %e,
                    "failed to mint execution credential, continuing without"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::credentials::CredentialSealer;
    use crate::defaults::{
        InMemoryCredentialVault, InMemoryEventDocumentStore, UnavailableCredentialIssuer,
        UnavailableCredentialVault,
    };
    use crate::registry::TriggerDefinition;
    use crate::schema::{FieldSchema, ObjectSchema};
    use crate::testing::StaticCredentialIssuer;
    use crate::types::CredentialType;

    fn triggers() -> TriggerRegistry {
        TriggerRegistry::from_definitions([TriggerDefinition::new("demo.event")
            .with_schema(ObjectSchema::new().field("a", FieldSchema::string().required()))])
        .unwrap()
    }

    fn service(broker: CredentialBroker) -> (EventEmissionService, Arc<InMemoryEventDocumentStore>) {
        let docs = Arc::new(InMemoryEventDocumentStore::new());
        let svc = EventEmissionService::new(
            triggers(),
            EventStore::new(docs.clone()),
            broker,
            EmissionConfig::default(),
        );
        (svc, docs)
    }

    fn no_credentials() -> CredentialBroker {
        CredentialBroker::new(
            Arc::new(UnavailableCredentialIssuer),
            Arc::new(UnavailableCredentialVault),
            None,
        )
    }

    #[tokio::test]
    async fn emit_defaults_space_and_principal() {
        let (svc, _) = service(no_credentials());
        let receipt = svc
            .emit("demo.event", json!({"a": "x"}), &RequestContext::new())
            .await
            .unwrap();
        let event = svc.events.get_by_id(&receipt.event_id).await.unwrap().unwrap();
        assert_eq!(event.space_id, "default");
        assert_eq!(event.status, EventStatus::Pending);
        assert_eq!(event.credential_ref.principal_id, "system");
        assert_eq!(event.credential_ref.credential_type, CredentialType::Service);
        assert!(event.credential_ref.api_key_id.is_none());
    }

    #[tokio::test]
    async fn rejected_emission_persists_nothing() {
        let (svc, docs) = service(no_credentials());
        let err = svc
            .emit("demo.event", json!({"b": 1}), &RequestContext::new())
            .await
            .unwrap_err();
        match err {
            EmitError::PayloadValidation { violations, .. } => assert_eq!(violations.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        let err = svc
            .emit("nope", json!({}), &RequestContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EmitError::UnknownTrigger { .. }));
        assert!(docs.is_empty().await);
    }

    #[tokio::test]
    async fn credential_is_minted_for_the_principal() {
        let broker = CredentialBroker::new(
            Arc::new(StaticCredentialIssuer::new("tok")),
            Arc::new(InMemoryCredentialVault::new()),
            Some(CredentialSealer::generate()),
        );
        let (svc, _) = service(broker.clone());
        let ctx = RequestContext::new()
            .in_space("s1")
            .as_principal(Principal::user("u1"));
        let receipt = svc.emit("demo.event", json!({"a": "x"}), &ctx).await.unwrap();

        let event = svc.events.get_by_id(&receipt.event_id).await.unwrap().unwrap();
        assert_eq!(event.space_id, "s1");
        assert_eq!(event.credential_ref.principal_id, "u1");
        let minted_id = event.credential_ref.api_key_id.clone().unwrap();

        let resolved = broker
            .resolve(&event.id, &event.credential_ref)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.id, minted_id);
    }

    #[tokio::test]
    async fn mint_failure_does_not_block_emission() {
        let broker = CredentialBroker::new(
            Arc::new(StaticCredentialIssuer::failing()),
            Arc::new(InMemoryCredentialVault::new()),
            Some(CredentialSealer::generate()),
        );
        let (svc, docs) = service(broker);
        svc.emit("demo.event", json!({"a": "x"}), &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(docs.len().await, 1);
    }
}
