//! Default implementations for the pluggable event-router traits.
//!
//! These let the pipeline start with zero external configuration. Each can
//! be replaced via [`EventPipelineBuilder`](crate::pipeline::EventPipelineBuilder).

pub mod in_memory_events;
pub mod in_memory_subscriptions;
pub mod in_memory_vault;
pub mod in_memory_workflows;
pub mod unavailable;

pub use in_memory_events::InMemoryEventDocumentStore;
pub use in_memory_subscriptions::InMemorySubscriptionStore;
pub use in_memory_vault::InMemoryCredentialVault;
pub use in_memory_workflows::InMemoryWorkflowSource;
pub use unavailable::{UnavailableCredentialIssuer, UnavailableCredentialVault};
