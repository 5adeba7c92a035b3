//! Pipeline builder: assembles the trigger pipeline components.

use std::sync::Arc;

use crate::config::{EmissionConfig, RouterConfig};
use crate::credentials::{CredentialBroker, CredentialSealer};
use crate::defaults::{
    InMemoryEventDocumentStore, InMemorySubscriptionStore, InMemoryWorkflowSource,
    UnavailableCredentialIssuer, UnavailableCredentialVault,
};
use crate::emission::EventEmissionService;
use crate::errors::PipelineError;
use crate::event_store::EventStore;
use crate::query::KqlEvaluator;
use crate::registry::{TriggerDefinition, TriggerRegistry, builtin_triggers};
use crate::router::{EventRouter, RouterTask};
use crate::subscriptions::SubscriptionRegistry;
use crate::template::PlaceholderTemplateEngine;
use crate::traits::{
    CredentialIssuer, CredentialVault, EventDocumentStore, ExecutionEngine, FilterEvaluator,
    SubscriptionDocumentStore, TemplateEngine, WorkflowSource,
};

/// The assembled services. Every field is cheaply cloneable and shares
/// state with the others.
#[derive(Clone)]
pub struct EventPipeline {
    pub triggers: TriggerRegistry,
    pub events: EventStore,
    pub subscriptions: SubscriptionRegistry,
    pub emitter: EventEmissionService,
    pub router: EventRouter,
}

impl EventPipeline {
    /// A periodic task driving this pipeline's router.
    pub fn router_task(&self) -> RouterTask {
        RouterTask::new(self.router.clone())
    }
}

/// Builder for [`EventPipeline`].
///
/// Only the execution engine is required. Stores default to in-memory
/// implementations, credential capabilities default to unavailable, and
/// the built-in triggers are registered unless disabled.
pub struct EventPipelineBuilder {
    triggers: Vec<TriggerDefinition>,
    builtin_triggers: bool,
    event_documents: Option<Arc<dyn EventDocumentStore>>,
    subscription_documents: Option<Arc<dyn SubscriptionDocumentStore>>,
    workflows: Option<Arc<dyn WorkflowSource>>,
    engine: Option<Arc<dyn ExecutionEngine>>,
    issuer: Option<Arc<dyn CredentialIssuer>>,
    vault: Option<Arc<dyn CredentialVault>>,
    sealer: Option<CredentialSealer>,
    templates: Option<Arc<dyn TemplateEngine>>,
    filters: Option<Arc<dyn FilterEvaluator>>,
    router_config: RouterConfig,
    emission_config: EmissionConfig,
}

impl Default for EventPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPipelineBuilder {
    pub fn new() -> Self {
        Self {
            triggers: Vec::new(),
            builtin_triggers: true,
            event_documents: None,
            subscription_documents: None,
            workflows: None,
            engine: None,
            issuer: None,
            vault: None,
            sealer: None,
            templates: None,
            filters: None,
            router_config: RouterConfig::default(),
            emission_config: EmissionConfig::default(),
        }
    }

    pub fn trigger(mut self, definition: TriggerDefinition) -> Self {
        self.triggers.push(definition);
        self
    }

    pub fn triggers(mut self, definitions: impl IntoIterator<Item = TriggerDefinition>) -> Self {
        self.triggers.extend(definitions);
        self
    }

    /// Skip registering `workflow.error` and `external.event`.
    pub fn without_builtin_triggers(mut self) -> Self {
        self.builtin_triggers = false;
        self
    }

    pub fn event_documents(mut self, store: Arc<dyn EventDocumentStore>) -> Self {
        self.event_documents = Some(store);
        self
    }

    pub fn subscription_documents(mut self, store: Arc<dyn SubscriptionDocumentStore>) -> Self {
        self.subscription_documents = Some(store);
        self
    }

    pub fn workflow_source(mut self, source: Arc<dyn WorkflowSource>) -> Self {
        self.workflows = Some(source);
        self
    }

    pub fn execution_engine(mut self, engine: Arc<dyn ExecutionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn credential_issuer(mut self, issuer: Arc<dyn CredentialIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    pub fn credential_vault(mut self, vault: Arc<dyn CredentialVault>) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn credential_sealer(mut self, sealer: CredentialSealer) -> Self {
        self.sealer = Some(sealer);
        self
    }

    pub fn template_engine(mut self, templates: Arc<dyn TemplateEngine>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn filter_evaluator(mut self, filters: Arc<dyn FilterEvaluator>) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn router_config(mut self, config: RouterConfig) -> Self {
        self.router_config = config;
        self
    }

    pub fn emission_config(mut self, config: EmissionConfig) -> Self {
        self.emission_config = config;
        self
    }

    /// Register triggers and wire every component. Fails on a duplicate
    /// trigger id or a missing execution engine.
    pub fn build(self) -> Result<EventPipeline, PipelineError> {
        let engine = self.engine.ok_or_else(|| PipelineError::Build {
            message: "an execution engine is required".into(),
        })?;

        let definitions = if self.builtin_triggers {
            builtin_triggers().into_iter().chain(self.triggers).collect()
        } else {
            self.triggers
        };
        let triggers = TriggerRegistry::from_definitions(definitions)?;

        let event_documents = self
            .event_documents
            .unwrap_or_else(|| Arc::new(InMemoryEventDocumentStore::new()));
        let subscription_documents = self
            .subscription_documents
            .unwrap_or_else(|| Arc::new(InMemorySubscriptionStore::new()));
        let workflows = self
            .workflows
            .unwrap_or_else(|| Arc::new(InMemoryWorkflowSource::new()));
        let issuer = self
            .issuer
            .unwrap_or_else(|| Arc::new(UnavailableCredentialIssuer));
        let vault = self
            .vault
            .unwrap_or_else(|| Arc::new(UnavailableCredentialVault));
        let templates = self
            .templates
            .unwrap_or_else(|| Arc::new(PlaceholderTemplateEngine));
        let filters = self.filters.unwrap_or_else(|| Arc::new(KqlEvaluator));

        let events = EventStore::new(event_documents);
        let subscriptions =
            SubscriptionRegistry::new(subscription_documents, triggers.clone(), filters.clone())
                .with_page_size(self.router_config.subscription_page_size);
        let credentials = CredentialBroker::new(issuer, vault, self.sealer);

        let emitter = EventEmissionService::new(
            triggers.clone(),
            events.clone(),
            credentials.clone(),
            self.emission_config,
        );
        let router = EventRouter {
            events: events.clone(),
            subscriptions: subscriptions.clone(),
            triggers: triggers.clone(),
            workflows,
            credentials,
            engine,
            templates,
            filters,
            config: self.router_config,
        };

        tracing::debug!(triggers = triggers.list().len(), "event pipeline built");
        Ok(EventPipeline {
            triggers,
            events,
            subscriptions,
            emitter,
            router,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RegistryError;
    use crate::testing::RecordingExecutionEngine;

    #[test]
    fn builtins_are_registered_by_default() {
        let p = EventPipelineBuilder::new()
            .execution_engine(Arc::new(RecordingExecutionEngine::new()))
            .build()
            .unwrap();
        assert!(p.triggers.has("workflow.error"));
        assert!(p.triggers.has("external.event"));

        let p = EventPipelineBuilder::new()
            .without_builtin_triggers()
            .execution_engine(Arc::new(RecordingExecutionEngine::new()))
            .build()
            .unwrap();
        assert!(p.triggers.list().is_empty());
    }

    #[test]
    fn build_requires_engine_and_unique_triggers() {
        assert!(matches!(
            EventPipelineBuilder::new().build(),
            Err(PipelineError::Build { .. })
        ));
        let err = EventPipelineBuilder::new()
            .trigger(TriggerDefinition::new("workflow.error"))
            .execution_engine(Arc::new(RecordingExecutionEngine::new()))
            .build();
        assert!(matches!(
            err,
            Err(PipelineError::Registry(RegistryError::DuplicateTrigger { .. }))
        ));
    }
}
