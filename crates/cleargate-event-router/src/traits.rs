//! Plugin trait interfaces for the event router.
//!
//! Every pluggable backend and collaborator is a trait here. In-memory
//! defaults live in [`defaults`](crate::defaults); SeaORM-backed stores
//! live in `cleargate-storage-oss`.

use async_trait::async_trait;
use serde_json::Value;

use super::errors::*;
use super::types::*;

// ---------------------------------------------------------------------------
// EventDocumentStore
// ---------------------------------------------------------------------------

/// Revisioned document storage for events.
///
/// Backends only provide primitives; the claim and reclaim algorithms live
/// in [`EventStore`](crate::event_store::EventStore). Every successful
/// write must bump the revision.
#[async_trait]
pub trait EventDocumentStore: Send + Sync {
    /// Insert a new event. No overwrite detection: the caller guarantees a
    /// unique id.
    async fn index(&self, event: Event) -> Result<Revisioned<Event>, EventStoreError>;

    async fn get(&self, id: &str) -> Result<Option<Revisioned<Event>>, EventStoreError>;

    /// Filter, sort by timestamp and page. `total` counts every match
    /// before paging.
    async fn search(
        &self,
        query: &EventQuery,
    ) -> Result<EventPage<Revisioned<Event>>, EventStoreError>;

    /// Apply `patch` only if the stored revision equals `expected`.
    ///
    /// Returns [`EventStoreError::VersionConflict`] when it does not and
    /// [`EventStoreError::NotFound`] when the event is gone.
    async fn update_if_revision(
        &self,
        id: &str,
        expected: u64,
        patch: &EventPatch,
    ) -> Result<Revisioned<Event>, EventStoreError>;

    /// Apply `patch` unconditionally.
    async fn update(&self, id: &str, patch: &EventPatch)
    -> Result<Revisioned<Event>, EventStoreError>;
}

// ---------------------------------------------------------------------------
// SubscriptionDocumentStore
// ---------------------------------------------------------------------------

/// Persistence for subscriptions. Validation happens in
/// [`SubscriptionRegistry`](crate::subscriptions::SubscriptionRegistry).
#[async_trait]
pub trait SubscriptionDocumentStore: Send + Sync {
    async fn insert(&self, subscription: &Subscription) -> Result<(), SubscriptionError>;

    async fn get(&self, id: &str) -> Result<Option<Subscription>, SubscriptionError>;

    /// Overwrite an existing subscription. `NotFound` if it does not exist.
    async fn replace(&self, subscription: &Subscription) -> Result<(), SubscriptionError>;

    /// Returns whether a document was removed.
    async fn delete(&self, id: &str) -> Result<bool, SubscriptionError>;

    /// At most `query.limit` matches, oldest first.
    async fn search(&self, query: &SubscriptionQuery)
    -> Result<Vec<Subscription>, SubscriptionError>;
}

// ---------------------------------------------------------------------------
// WorkflowSource
// ---------------------------------------------------------------------------

/// Read-only access to workflow definitions, which another subsystem owns.
#[async_trait]
pub trait WorkflowSource: Send + Sync {
    /// Look up a workflow by id within a space. Soft-deleted rows may be
    /// returned; callers decide dispatchability via
    /// [`WorkflowRecord::into_execution_model`].
    async fn get(
        &self,
        workflow_id: &str,
        space_id: &str,
    ) -> Result<Option<WorkflowRecord>, WorkflowStoreError>;
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Issues credentials that let an execution act as a principal.
///
/// Optional capability: the null implementation reports itself
/// unavailable and emission carries on without minting.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    fn is_available(&self) -> bool;

    /// Mint a reusable credential scoped to `principal` in `space_id`.
    async fn mint_for(
        &self,
        principal: &Principal,
        space_id: &str,
    ) -> Result<ExecutionCredential, CredentialError>;

    /// Resolve a previously minted credential by id. Default: unknown.
    async fn resolve(
        &self,
        _credential_id: &str,
    ) -> Result<Option<ExecutionCredential>, CredentialError> {
        Ok(None)
    }
}

/// Out-of-band storage for sealed credentials, keyed by event id.
#[async_trait]
pub trait CredentialVault: Send + Sync {
    fn is_available(&self) -> bool;

    async fn put(&self, event_id: &str, credential: &SealedCredential)
    -> Result<(), CredentialError>;

    async fn get(&self, event_id: &str) -> Result<Option<SealedCredential>, CredentialError>;
}

// ---------------------------------------------------------------------------
// ExecutionEngine
// ---------------------------------------------------------------------------

/// The downstream workflow executor. Opaque to the router: a returned
/// error is logged and isolated to the subscription that dispatched.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn execute(
        &self,
        workflow: &WorkflowExecutionModel,
        context: ExecutionContext,
    ) -> Result<ExecutionOutcome, ExecutionError>;
}

// ---------------------------------------------------------------------------
// Pure collaborators
// ---------------------------------------------------------------------------

/// Renders a filter template against an evaluation context.
///
/// `Ok(None)` means the template resolved to nothing (undefined).
pub trait TemplateEngine: Send + Sync {
    fn render(&self, template: &str, context: &Value) -> Result<Option<Value>, TemplateError>;
}

/// Evaluates filter query strings.
pub trait FilterEvaluator: Send + Sync {
    fn evaluate(&self, query: &str, context: &Value) -> Result<bool, QueryError>;

    /// Field paths a query refers to, for write-time validation.
    fn referenced_fields(&self, query: &str) -> Result<Vec<String>, QueryError>;
}
