pub mod event;
pub mod event_credential;
pub mod subscription;
pub mod workflow_definition;
