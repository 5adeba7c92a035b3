//! In-memory credential vault.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::errors::CredentialError;
use crate::traits::CredentialVault;
use crate::types::SealedCredential;

/// Holds sealed credentials keyed by event id. Only ever sees ciphertext.
#[derive(Clone, Default)]
pub struct InMemoryCredentialVault {
    entries: Arc<RwLock<HashMap<String, SealedCredential>>>,
}

impl InMemoryCredentialVault {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialVault for InMemoryCredentialVault {
    fn is_available(&self) -> bool {
        true
    }

    async fn put(
        &self,
        event_id: &str,
        credential: &SealedCredential,
    ) -> Result<(), CredentialError> {
        self.entries
            .write()
            .insert(event_id.to_string(), credential.clone());
        Ok(())
    }

    async fn get(&self, event_id: &str) -> Result<Option<SealedCredential>, CredentialError> {
        Ok(self.entries.read().get(event_id).cloned())
    }
}
