//! SeaORM-backed workflow lookup.
//!
//! The router only reads workflows. [`SeaOrmWorkflowSource::upsert`] exists
//! for the subsystem that owns them and for seeding tests.

use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, DatabaseConnection};
use std::sync::Arc;

use crate::models::workflow_definition;

use cleargate_event_router::errors::WorkflowStoreError;
use cleargate_event_router::traits::WorkflowSource;
use cleargate_event_router::types::{WorkflowDefinition, WorkflowRecord};

/// Database-backed source of workflow definitions.
pub struct SeaOrmWorkflowSource {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmWorkflowSource {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert or overwrite a workflow.
    pub async fn upsert(&self, record: &WorkflowRecord) -> Result<(), WorkflowStoreError> {
        let definition = record
            .definition
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(to_store_err)?;
        let model = workflow_definition::ActiveModel {
            id: ActiveValue::Set(record.id.clone()),
            space_id: ActiveValue::Set(record.space_id.clone()),
            name: ActiveValue::Set(record.name.clone()),
            enabled: ActiveValue::Set(record.enabled),
            valid: ActiveValue::Set(record.valid),
            deleted_at: ActiveValue::Set(record.deleted_at.map(|t| t.naive_utc())),
            definition: ActiveValue::Set(definition),
            updated_at: ActiveValue::Set(chrono::Utc::now().naive_utc()),
        };

        workflow_definition::Entity::insert(model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(workflow_definition::Column::Id)
                    .update_columns([
                        workflow_definition::Column::SpaceId,
                        workflow_definition::Column::Name,
                        workflow_definition::Column::Enabled,
                        workflow_definition::Column::Valid,
                        workflow_definition::Column::DeletedAt,
                        workflow_definition::Column::Definition,
                        workflow_definition::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(to_store_err)?;
        Ok(())
    }
}

fn to_store_err(e: impl std::fmt::Display) -> WorkflowStoreError {
    WorkflowStoreError::Store {
        message: e.to_string(),
    }
}

fn model_to_record(m: workflow_definition::Model) -> Result<WorkflowRecord, WorkflowStoreError> {
    let definition = m
        .definition
        .map(serde_json::from_value::<WorkflowDefinition>)
        .transpose()
        .map_err(|e| to_store_err(format!("workflow {}: bad definition: {e}", m.id)))?;
    Ok(WorkflowRecord {
        id: m.id,
        space_id: m.space_id,
        name: m.name,
        enabled: m.enabled,
        valid: m.valid,
        deleted_at: m.deleted_at.map(|t| t.and_utc()),
        definition,
    })
}

#[async_trait]
impl WorkflowSource for SeaOrmWorkflowSource {
    async fn get(
        &self,
        workflow_id: &str,
        space_id: &str,
    ) -> Result<Option<WorkflowRecord>, WorkflowStoreError> {
        let model = workflow_definition::Entity::find()
            .filter(workflow_definition::Column::Id.eq(workflow_id))
            .filter(workflow_definition::Column::SpaceId.eq(space_id))
            .one(self.db.as_ref())
            .await
            .map_err(to_store_err)?;
        model.map(model_to_record).transpose()
    }
}
