//! Error types for all event-router trait operations.

use thiserror::Error;

use crate::schema::SchemaViolation;
use crate::types::Event;

/// Errors from [`EventDocumentStore`](super::traits::EventDocumentStore)
/// and the [`EventStore`](super::event_store::EventStore) built on it.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("event not found: {id}")]
    NotFound { id: String },
    /// The document changed since it was read. Claim and reclaim treat this
    /// as "another router got there first".
    #[error("event {id} revision conflict: expected {expected}")]
    VersionConflict { id: String, expected: u64 },
    #[error("event store error: {message}")]
    Store { message: String },
}

/// A claim or reclaim batch stopped early on a store failure.
///
/// Events transitioned before the failure are carried in `partial`; they
/// belong to the caller, who must still process or release them.
#[derive(Debug, Error)]
#[error("batch aborted after {} event(s): {source}", .partial.len())]
pub struct BatchAborted {
    pub partial: Vec<Event>,
    #[source]
    pub source: EventStoreError,
}

/// Errors from the subscription registry and its document store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubscriptionError {
    #[error("unknown trigger type: {trigger_type}")]
    UnknownTrigger { trigger_type: String },
    #[error("trigger {trigger_type} declares no event schema")]
    MissingSchema { trigger_type: String },
    #[error("filter references unknown properties: {}", invalid_paths.join(", "))]
    FilterValidation { invalid_paths: Vec<String> },
    #[error("invalid filter syntax: {message}")]
    FilterSyntax { message: String },
    #[error("subscription not found: {id}")]
    NotFound { id: String },
    #[error("subscription store error: {message}")]
    Store { message: String },
}

/// Errors surfaced synchronously by
/// [`EventEmissionService::emit`](super::emission::EventEmissionService::emit).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EmitError {
    #[error("unknown trigger type: {trigger_type}")]
    UnknownTrigger { trigger_type: String },
    #[error("payload does not match schema of {trigger_type}: {}", format_violations(violations))]
    PayloadValidation {
        trigger_type: String,
        violations: Vec<SchemaViolation>,
    },
    #[error("failed to persist event: {0}")]
    Store(#[from] EventStoreError),
}

fn format_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from trigger registration. Raised at setup time only.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("trigger already registered: {id}")]
    DuplicateTrigger { id: String },
}

/// Errors from [`EventPipelineBuilder::build`](super::pipeline::EventPipelineBuilder::build).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    #[error("trigger registration failed: {0}")]
    Registry(#[from] RegistryError),
    #[error("build error: {message}")]
    Build { message: String },
}

/// Errors from [`CredentialIssuer`](super::traits::CredentialIssuer) and
/// [`CredentialVault`](super::traits::CredentialVault).
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential capability unavailable")]
    Unavailable,
    #[error("credential issuer error: {message}")]
    Issuer { message: String },
    #[error("credential vault error: {message}")]
    Vault { message: String },
    #[error("credential seal error: {message}")]
    Seal { message: String },
}

/// Errors from [`WorkflowSource`](super::traits::WorkflowSource).
#[derive(Debug, Error)]
pub enum WorkflowStoreError {
    #[error("workflow store error: {message}")]
    Store { message: String },
}

/// Errors from [`ExecutionEngine`](super::traits::ExecutionEngine).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutionError {
    #[error("execution rejected: {message}")]
    Rejected { message: String },
    #[error("execution engine unreachable: {message}")]
    Transport { message: String },
    #[error("dispatch timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Errors from parsing a filter query.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    #[error("query parse error: {message}")]
    Parse { message: String },
}

/// Errors from template rendering.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unterminated placeholder at offset {offset}")]
    Unterminated { offset: usize },
    #[error("empty placeholder at offset {offset}")]
    EmptyPlaceholder { offset: usize },
}

/// Failure while handling one subscription of one event. Logged and
/// counted; sibling subscriptions and events carry on.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubscriptionDispatchError {
    #[error("filter template failed: {0}")]
    Template(#[from] TemplateError),
    #[error("filter rendered to {found}, expected a boolean or a query string")]
    FilterType { found: &'static str },
    #[error("filter query failed: {0}")]
    Query(#[from] QueryError),
    #[error("workflow lookup failed: {0}")]
    Workflow(#[from] WorkflowStoreError),
    #[error("dispatch failed: {0}")]
    Execution(#[from] ExecutionError),
}

/// Failure while handling a claimed event as a whole. The event is left
/// `Processing` and comes back through reclamation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EventProcessingError {
    #[error("subscription lookup failed: {0}")]
    Subscriptions(#[from] SubscriptionError),
    #[error("failed to complete event: {0}")]
    Store(#[from] EventStoreError),
}

/// Errors that abort a whole router cycle. Everything narrower is caught
/// and logged inside the cycle.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RouterError {
    #[error("failed to reclaim stale events: {0}")]
    Reclaim(#[source] BatchAborted),
    #[error("failed to claim pending events: {0}")]
    Claim(#[source] BatchAborted),
}
