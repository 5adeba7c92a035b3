//! Event-driven workflow triggers.
//!
//! Producers emit typed events against registered trigger types; events are
//! persisted, claimed by a router with optimistic concurrency, matched
//! against subscriptions (trigger type plus an optional KQL filter) and
//! dispatched to an [`ExecutionEngine`] with inputs projected from the
//! payload.
//!
//! Storage, workflow lookup, credential issuance and execution are traits;
//! [`EventPipelineBuilder`] wires them together and falls back to in-memory
//! defaults for anything left unset.

pub mod config;
pub mod credentials;
pub mod defaults;
pub mod emission;
pub mod errors;
pub mod event_store;
pub mod filter;
pub mod pipeline;
pub mod query;
pub mod registry;
pub mod router;
pub mod schema;
pub mod subscriptions;
pub mod template;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod types;

// Re-export public types at the crate level.

// config
pub use config::{EmissionConfig, RouterConfig};

// credentials
pub use credentials::{CredentialBroker, CredentialSealer};

// defaults
pub use defaults::{
    InMemoryCredentialVault, InMemoryEventDocumentStore, InMemorySubscriptionStore,
    InMemoryWorkflowSource, UnavailableCredentialIssuer, UnavailableCredentialVault,
};

// emission
pub use emission::{EmitReceipt, EventEmissionService, RequestContext};

// errors
pub use errors::{
    BatchAborted, CredentialError, EmitError, EventProcessingError, EventStoreError,
    ExecutionError, PipelineError, QueryError, RegistryError, RouterError,
    SubscriptionDispatchError, SubscriptionError, TemplateError, WorkflowStoreError,
};

// event_store
pub use event_store::EventStore;

// filter
pub use filter::validate_filter;

// pipeline
pub use pipeline::{EventPipeline, EventPipelineBuilder};

// query
pub use query::{KqlEvaluator, Query};

// registry
pub use registry::{TriggerDefinition, TriggerRegistry, TriggerRegistryBuilder, builtin_triggers};

// router
pub use router::{CycleReport, EventRouter, InputProjection, RouterTask, TaskStats, project_inputs};

// schema
pub use schema::{FieldSchema, FieldType, ObjectSchema, PayloadSchema, SchemaViolation, ViolationKind};

// subscriptions
pub use subscriptions::SubscriptionRegistry;

// template
pub use template::PlaceholderTemplateEngine;

// traits
pub use traits::{
    CredentialIssuer, CredentialVault, EventDocumentStore, ExecutionEngine, FilterEvaluator,
    SubscriptionDocumentStore, TemplateEngine, WorkflowSource,
};

// types
pub use types::{
    CredentialRef, CredentialType, DEFAULT_SPACE_ID, Event, EventPage, EventPatch, EventQuery,
    EventSnapshot, EventStatus, ExecutionContext, ExecutionCredential, ExecutionOutcome,
    InputSource, InputType, NewSubscription, Principal, Revisioned, SYSTEM_PRINCIPAL,
    SealedCredential, SortOrder, Subscription, SubscriptionQuery, SubscriptionUpdate, TriggeredBy,
    WorkflowDefinition, WorkflowExecutionModel, WorkflowInput, WorkflowRecord,
};
