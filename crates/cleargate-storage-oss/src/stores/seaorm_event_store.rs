//! SeaORM-backed event document store.
//!
//! Optimistic concurrency uses the `revision` column: conditional updates
//! filter on the expected revision and bump it in the same statement, so a
//! zero-row update means someone else wrote first (or the row is gone).

use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveValue, Condition, DatabaseConnection, PaginatorTrait, QueryOrder, QuerySelect};
use std::sync::Arc;

use crate::models::event;

use cleargate_event_router::errors::EventStoreError;
use cleargate_event_router::traits::EventDocumentStore;
use cleargate_event_router::types::{
    CredentialRef, CredentialType, Event, EventPage, EventPatch, EventQuery, EventStatus,
    Revisioned, SortOrder,
};

/// Database-backed store for events.
pub struct SeaOrmEventStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmEventStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn require(&self, id: &str) -> Result<Revisioned<Event>, EventStoreError> {
        self.get(id)
            .await?
            .ok_or_else(|| EventStoreError::NotFound { id: id.to_string() })
    }

    /// Run the patch as a single UPDATE, optionally guarded by revision.
    async fn apply_patch(
        &self,
        id: &str,
        expected: Option<u64>,
        patch: &EventPatch,
    ) -> Result<u64, EventStoreError> {
        let mut update = event::Entity::update_many()
            .col_expr(event::Column::Status, Expr::value(patch.status.as_str()))
            .col_expr(
                event::Column::Revision,
                Expr::col(event::Column::Revision).add(1),
            )
            .filter(event::Column::Id.eq(id));
        if let Some(started) = patch.processing_started_at {
            update = update.col_expr(
                event::Column::ProcessingStartedAt,
                Expr::value(started.map(|t| t.naive_utc())),
            );
        }
        if let Some(expected) = expected {
            update = update.filter(event::Column::Revision.eq(expected as i64));
        }
        let result = update.exec(self.db.as_ref()).await.map_err(to_store_err)?;
        Ok(result.rows_affected)
    }
}

fn to_store_err(e: impl std::fmt::Display) -> EventStoreError {
    EventStoreError::Store {
        message: e.to_string(),
    }
}

/// The state a guarded update wrote: the immutable fields from `current`,
/// the patched ones from `patch`, and the revision it produced.
fn as_written(current: Revisioned<Event>, expected: u64, patch: &EventPatch) -> Revisioned<Event> {
    let mut event = current.into_inner();
    patch.apply(&mut event);
    Revisioned::new(event, expected + 1)
}

fn model_to_event(m: event::Model) -> Result<Revisioned<Event>, EventStoreError> {
    let status = EventStatus::parse(&m.status)
        .ok_or_else(|| to_store_err(format!("event {}: unknown status '{}'", m.id, m.status)))?;
    let credential_type = CredentialType::parse(&m.credential_type).ok_or_else(|| {
        to_store_err(format!(
            "event {}: unknown credential type '{}'",
            m.id, m.credential_type
        ))
    })?;
    let event = Event {
        id: m.id,
        trigger_type: m.trigger_type,
        payload: m.payload,
        space_id: m.space_id,
        timestamp: m.timestamp.and_utc(),
        status,
        processing_started_at: m.processing_started_at.map(|t| t.and_utc()),
        credential_ref: CredentialRef {
            credential_type,
            principal_id: m.principal_id,
            api_key_id: m.api_key_id,
        },
    };
    Ok(Revisioned::new(event, m.revision as u64))
}

#[async_trait]
impl EventDocumentStore for SeaOrmEventStore {
    async fn index(&self, event: Event) -> Result<Revisioned<Event>, EventStoreError> {
        let model = event::ActiveModel {
            id: ActiveValue::Set(event.id.clone()),
            trigger_type: ActiveValue::Set(event.trigger_type.clone()),
            payload: ActiveValue::Set(event.payload.clone()),
            space_id: ActiveValue::Set(event.space_id.clone()),
            timestamp: ActiveValue::Set(event.timestamp.naive_utc()),
            status: ActiveValue::Set(event.status.as_str().to_string()),
            processing_started_at: ActiveValue::Set(
                event.processing_started_at.map(|t| t.naive_utc()),
            ),
            credential_type: ActiveValue::Set(
                event.credential_ref.credential_type.as_str().to_string(),
            ),
            principal_id: ActiveValue::Set(event.credential_ref.principal_id.clone()),
            api_key_id: ActiveValue::Set(event.credential_ref.api_key_id.clone()),
            revision: ActiveValue::Set(1),
        };

        event::Entity::insert(model)
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(to_store_err)?;
        Ok(Revisioned::new(event, 1))
    }

    async fn get(&self, id: &str) -> Result<Option<Revisioned<Event>>, EventStoreError> {
        let model = event::Entity::find_by_id(id.to_string())
            .one(self.db.as_ref())
            .await
            .map_err(to_store_err)?;
        model.map(model_to_event).transpose()
    }

    async fn search(
        &self,
        query: &EventQuery,
    ) -> Result<EventPage<Revisioned<Event>>, EventStoreError> {
        let mut select = event::Entity::find();
        if let Some(status) = query.status {
            select = select.filter(event::Column::Status.eq(status.as_str()));
        }
        if let Some(ref trigger_type) = query.trigger_type {
            select = select.filter(event::Column::TriggerType.eq(trigger_type.as_str()));
        }
        if let Some(ref space_id) = query.space_id {
            select = select.filter(event::Column::SpaceId.eq(space_id.as_str()));
        }
        if let Some(cutoff) = query.stale_before {
            select = select.filter(
                Condition::any()
                    .add(event::Column::ProcessingStartedAt.is_null())
                    .add(event::Column::ProcessingStartedAt.lt(cutoff.naive_utc())),
            );
        }

        let total = select
            .clone()
            .count(self.db.as_ref())
            .await
            .map_err(to_store_err)?;

        let select = match query.sort {
            SortOrder::OldestFirst => select
                .order_by_asc(event::Column::Timestamp)
                .order_by_asc(event::Column::Id),
            SortOrder::NewestFirst => select
                .order_by_desc(event::Column::Timestamp)
                .order_by_desc(event::Column::Id),
        };
        let models = select
            .offset(query.from as u64)
            .limit(query.size as u64)
            .all(self.db.as_ref())
            .await
            .map_err(to_store_err)?;

        let items = models
            .into_iter()
            .map(model_to_event)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EventPage {
            items,
            total: total as usize,
        })
    }

    async fn update_if_revision(
        &self,
        id: &str,
        expected: u64,
        patch: &EventPatch,
    ) -> Result<Revisioned<Event>, EventStoreError> {
        if self.apply_patch(id, Some(expected), patch).await? == 0 {
            // Distinguish a lost race from a missing row.
            return match self.get(id).await? {
                Some(_) => Err(EventStoreError::VersionConflict {
                    id: id.to_string(),
                    expected,
                }),
                None => Err(EventStoreError::NotFound { id: id.to_string() }),
            };
        }
        // Another writer may land between the UPDATE and this read.
        let current = self.require(id).await?;
        Ok(as_written(current, expected, patch))
    }

    async fn update(
        &self,
        id: &str,
        patch: &EventPatch,
    ) -> Result<Revisioned<Event>, EventStoreError> {
        if self.apply_patch(id, None, patch).await? == 0 {
            return Err(EventStoreError::NotFound { id: id.to_string() });
        }
        self.require(id).await
    }
}
