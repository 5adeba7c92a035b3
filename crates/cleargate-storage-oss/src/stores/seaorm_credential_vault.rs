//! SeaORM-backed vault for sealed execution credentials.

use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, DatabaseConnection};
use std::sync::Arc;

use crate::models::event_credential;

use cleargate_event_router::errors::CredentialError;
use cleargate_event_router::traits::CredentialVault;
use cleargate_event_router::types::SealedCredential;

/// Stores one sealed credential per event, outside the event document.
pub struct SeaOrmCredentialVault {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmCredentialVault {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn to_vault_err(e: impl std::fmt::Display) -> CredentialError {
    CredentialError::Vault {
        message: e.to_string(),
    }
}

#[async_trait]
impl CredentialVault for SeaOrmCredentialVault {
    fn is_available(&self) -> bool {
        true
    }

    async fn put(
        &self,
        event_id: &str,
        credential: &SealedCredential,
    ) -> Result<(), CredentialError> {
        let model = event_credential::ActiveModel {
            event_id: ActiveValue::Set(event_id.to_string()),
            credential_id: ActiveValue::Set(credential.id.clone()),
            principal_id: ActiveValue::Set(credential.principal_id.clone()),
            sealed_secret: ActiveValue::Set(credential.sealed_secret.clone()),
            created_at: ActiveValue::Set(chrono::Utc::now().naive_utc()),
        };

        event_credential::Entity::insert(model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(event_credential::Column::EventId)
                    .update_columns([
                        event_credential::Column::CredentialId,
                        event_credential::Column::PrincipalId,
                        event_credential::Column::SealedSecret,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(to_vault_err)?;
        Ok(())
    }

    async fn get(&self, event_id: &str) -> Result<Option<SealedCredential>, CredentialError> {
        let model = event_credential::Entity::find_by_id(event_id.to_string())
            .one(self.db.as_ref())
            .await
            .map_err(to_vault_err)?;
        Ok(model.map(|m| SealedCredential {
            id: m.credential_id,
            principal_id: m.principal_id,
            sealed_secret: m.sealed_secret,
        }))
    }
}
