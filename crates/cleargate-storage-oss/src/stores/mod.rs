mod seaorm_credential_vault;
mod seaorm_event_store;
mod seaorm_subscription_store;
mod seaorm_workflow_source;

pub use seaorm_credential_vault::SeaOrmCredentialVault;
pub use seaorm_event_store::SeaOrmEventStore;
pub use seaorm_subscription_store::SeaOrmSubscriptionStore;
pub use seaorm_workflow_source::SeaOrmWorkflowSource;
