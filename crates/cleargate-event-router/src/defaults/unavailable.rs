//! Null-object credential capabilities for deployments without them.

use async_trait::async_trait;

use crate::errors::CredentialError;
use crate::traits::{CredentialIssuer, CredentialVault};
use crate::types::{ExecutionCredential, Principal, SealedCredential};

/// A [`CredentialIssuer`] that never issues anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCredentialIssuer;

#[async_trait]
impl CredentialIssuer for UnavailableCredentialIssuer {
    fn is_available(&self) -> bool {
        false
    }

    async fn mint_for(
        &self,
        _principal: &Principal,
        _space_id: &str,
    ) -> Result<ExecutionCredential, CredentialError> {
        Err(CredentialError::Unavailable)
    }
}

/// A [`CredentialVault`] that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCredentialVault;

#[async_trait]
impl CredentialVault for UnavailableCredentialVault {
    fn is_available(&self) -> bool {
        false
    }

    async fn put(
        &self,
        _event_id: &str,
        _credential: &SealedCredential,
    ) -> Result<(), CredentialError> {
        Err(CredentialError::Unavailable)
    }

    async fn get(&self, _event_id: &str) -> Result<Option<SealedCredential>, CredentialError> {
        Ok(None)
    }
}
