//! Test doubles for collaborators the router depends on.
//!
//! Available to this crate's tests and, through the `test-support`
//! feature, to downstream crates.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::SecretString;
use uuid::Uuid;

use crate::errors::{CredentialError, ExecutionError};
use crate::traits::{CredentialIssuer, ExecutionEngine};
use crate::types::{
    ExecutionContext, ExecutionCredential, ExecutionOutcome, Principal, SYSTEM_PRINCIPAL,
    WorkflowExecutionModel,
};

/// One call observed by [`RecordingExecutionEngine`].
#[derive(Debug, Clone)]
pub struct RecordedDispatch {
    pub workflow: WorkflowExecutionModel,
    pub context: ExecutionContext,
}

/// An [`ExecutionEngine`] that records every dispatch.
#[derive(Clone, Default)]
pub struct RecordingExecutionEngine {
    calls: Arc<Mutex<Vec<RecordedDispatch>>>,
    failing: Arc<Mutex<BTreeSet<String>>>,
    delay: Option<Duration>,
}

impl RecordingExecutionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject dispatches to `workflow_id` (after recording them).
    pub fn fail_for(self, workflow_id: impl Into<String>) -> Self {
        self.failing.lock().insert(workflow_id.into());
        self
    }

    /// Sleep this long inside every dispatch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedDispatch> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ExecutionEngine for RecordingExecutionEngine {
    async fn execute(
        &self,
        workflow: &WorkflowExecutionModel,
        context: ExecutionContext,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        self.calls.lock().push(RecordedDispatch {
            workflow: workflow.clone(),
            context,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(&workflow.id) {
            return Err(ExecutionError::Rejected {
                message: format!("workflow {} rejected", workflow.id),
            });
        }
        Ok(ExecutionOutcome {
            execution_id: Uuid::new_v4().to_string(),
            status: Some("queued".into()),
        })
    }
}

/// A [`CredentialIssuer`] that hands out a fixed secret.
///
/// `resolve` answers for any id: minted ids keep their principal, unknown
/// ids resolve as the system principal.
#[derive(Clone)]
pub struct StaticCredentialIssuer {
    token: Option<String>,
    minted: Arc<Mutex<HashMap<String, String>>>,
}

impl StaticCredentialIssuer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            minted: Arc::default(),
        }
    }

    /// Reports itself available but fails every mint.
    pub fn failing() -> Self {
        Self {
            token: None,
            minted: Arc::default(),
        }
    }

    fn credential(&self, id: String, principal_id: String) -> Option<ExecutionCredential> {
        let token = self.token.clone()?;
        Some(ExecutionCredential {
            id,
            principal_id,
            secret: SecretString::from(token),
        })
    }
}

#[async_trait]
impl CredentialIssuer for StaticCredentialIssuer {
    fn is_available(&self) -> bool {
        true
    }

    async fn mint_for(
        &self,
        principal: &Principal,
        _space_id: &str,
    ) -> Result<ExecutionCredential, CredentialError> {
        let id = format!("key-{}", Uuid::new_v4());
        let credential = self
            .credential(id.clone(), principal.id.clone())
            .ok_or_else(|| CredentialError::Issuer {
                message: "issuer refused to mint".into(),
            })?;
        self.minted.lock().insert(id, principal.id.clone());
        Ok(credential)
    }

    async fn resolve(
        &self,
        credential_id: &str,
    ) -> Result<Option<ExecutionCredential>, CredentialError> {
        let principal_id = self
            .minted
            .lock()
            .get(credential_id)
            .cloned()
            .unwrap_or_else(|| SYSTEM_PRINCIPAL.to_string());
        Ok(self.credential(credential_id.to_string(), principal_id))
    }
}
