//! Execution credentials: mint at emission, recover at dispatch.
//!
//! Credentials are sealed with ChaCha20-Poly1305 before reaching the vault.
//! Sealed form is base64 of `nonce || ciphertext`. Both the issuer and the
//! vault are optional capabilities; the broker degrades to "no credential"
//! when either is missing.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{Aead, KeyInit, OsRng, rand_core::RngCore};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use secrecy::{ExposeSecret, SecretBox, SecretString};

use crate::errors::CredentialError;
use crate::traits::{CredentialIssuer, CredentialVault};
use crate::types::{CredentialRef, ExecutionCredential, Principal, SealedCredential};

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

// ---------------------------------------------------------------------------
// CredentialSealer
// ---------------------------------------------------------------------------

/// Symmetric sealing of credential secrets.
pub struct CredentialSealer {
    key: SecretBox<[u8; KEY_LEN]>,
}

impl std::fmt::Debug for CredentialSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialSealer([REDACTED])")
    }
}

impl CredentialSealer {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            key: SecretBox::new(Box::new(key)),
        }
    }

    /// A sealer with a random key. Sealed values do not survive a restart.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// Parse a base64-encoded 32-byte key.
    pub fn from_base64(encoded: &str) -> Result<Self, CredentialError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CredentialError::Seal {
                message: format!("invalid key encoding: {e}"),
            })?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| CredentialError::Seal {
            message: format!("key must be {KEY_LEN} bytes, got {}", b.len()),
        })?;
        Ok(Self::new(key))
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(self.key.expose_secret().into())
    }

    pub fn seal(&self, credential: &ExecutionCredential) -> Result<SealedCredential, CredentialError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher()
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                credential.secret.expose_secret().as_bytes(),
            )
            .map_err(|_| CredentialError::Seal {
                message: "encryption failed".into(),
            })?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(SealedCredential {
            id: credential.id.clone(),
            principal_id: credential.principal_id.clone(),
            sealed_secret: STANDARD.encode(combined),
        })
    }

    pub fn unseal(&self, sealed: &SealedCredential) -> Result<ExecutionCredential, CredentialError> {
        let combined = STANDARD
            .decode(&sealed.sealed_secret)
            .map_err(|_| CredentialError::Seal {
                message: "invalid sealed encoding".into(),
            })?;
        if combined.len() < NONCE_LEN {
            return Err(CredentialError::Seal {
                message: "sealed value too short".into(),
            });
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CredentialError::Seal {
                message: "decryption failed".into(),
            })?;
        let secret = String::from_utf8(plaintext).map_err(|_| CredentialError::Seal {
            message: "sealed secret is not UTF-8".into(),
        })?;
        Ok(ExecutionCredential {
            id: sealed.id.clone(),
            principal_id: sealed.principal_id.clone(),
            secret: SecretString::from(secret),
        })
    }
}

// ---------------------------------------------------------------------------
// CredentialBroker
// ---------------------------------------------------------------------------

/// Mints credentials on behalf of emitting principals and recovers them
/// for dispatch.
#[derive(Clone)]
pub struct CredentialBroker {
    issuer: Arc<dyn CredentialIssuer>,
    vault: Arc<dyn CredentialVault>,
    sealer: Option<Arc<CredentialSealer>>,
}

impl CredentialBroker {
    pub fn new(
        issuer: Arc<dyn CredentialIssuer>,
        vault: Arc<dyn CredentialVault>,
        sealer: Option<CredentialSealer>,
    ) -> Self {
        Self {
            issuer,
            vault,
            sealer: sealer.map(Arc::new),
        }
    }

    /// Whether minted credentials can be stored for later dispatch.
    pub fn can_mint(&self) -> bool {
        self.issuer.is_available() && self.vault.is_available() && self.sealer.is_some()
    }

    /// Mint a credential for `principal` and store it sealed under
    /// `event_id`. Returns the credential id, or `None` when the capability
    /// is absent.
    pub async fn mint_for_event(
        &self,
        principal: &Principal,
        space_id: &str,
        event_id: &str,
    ) -> Result<Option<String>, CredentialError> {
        let Some(sealer) = self.sealer.as_ref().filter(|_| self.can_mint()) else {
            return Ok(None);
        };
        let credential = self.issuer.mint_for(principal, space_id).await?;
        let sealed = sealer.seal(&credential)?;
        self.vault.put(event_id, &sealed).await?;
        tracing::debug!(
            event_id = %event_id,
            principal_id = %principal.id,
            credential_id = %credential.id,
            "execution credential minted"
        );
        Ok(Some(credential.id))
    }

    /// Recover the credential minted for `event_id`.
    ///
    /// Tries the vault first, then asks the issuer to resolve the
    /// credential id recorded on the event.
    pub async fn resolve(
        &self,
        event_id: &str,
        credential_ref: &CredentialRef,
    ) -> Result<Option<ExecutionCredential>, CredentialError> {
        if let Some(sealer) = &self.sealer {
            if self.vault.is_available() {
                if let Some(sealed) = self.vault.get(event_id).await? {
                    return sealer.unseal(&sealed).map(Some);
                }
            }
        }
        match &credential_ref.api_key_id {
            Some(id) if self.issuer.is_available() => self.issuer.resolve(id).await,
            _ => Ok(None),
        }
    }
}
