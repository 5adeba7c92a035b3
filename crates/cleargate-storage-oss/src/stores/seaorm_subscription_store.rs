//! SeaORM-backed subscription store.

use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelTrait, ActiveValue, DatabaseConnection, QueryOrder, QuerySelect};
use std::sync::Arc;

use crate::models::subscription;

use cleargate_event_router::errors::SubscriptionError;
use cleargate_event_router::traits::SubscriptionDocumentStore;
use cleargate_event_router::types::{Subscription, SubscriptionQuery};

/// Database-backed store for trigger subscriptions.
pub struct SeaOrmSubscriptionStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmSubscriptionStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn to_store_err(e: impl std::fmt::Display) -> SubscriptionError {
    SubscriptionError::Store {
        message: e.to_string(),
    }
}

fn to_active_model(s: &Subscription) -> subscription::ActiveModel {
    subscription::ActiveModel {
        id: ActiveValue::Set(s.id.clone()),
        workflow_id: ActiveValue::Set(s.workflow_id.clone()),
        trigger_type: ActiveValue::Set(s.trigger_type.clone()),
        space_id: ActiveValue::Set(s.space_id.clone()),
        where_clause: ActiveValue::Set(s.where_clause.clone()),
        enabled: ActiveValue::Set(s.enabled),
        created_at: ActiveValue::Set(s.created_at.naive_utc()),
        updated_at: ActiveValue::Set(s.updated_at.naive_utc()),
        created_by: ActiveValue::Set(s.created_by.clone()),
    }
}

fn model_to_subscription(m: subscription::Model) -> Subscription {
    Subscription {
        id: m.id,
        workflow_id: m.workflow_id,
        trigger_type: m.trigger_type,
        space_id: m.space_id,
        where_clause: m.where_clause,
        enabled: m.enabled,
        created_at: m.created_at.and_utc(),
        updated_at: m.updated_at.and_utc(),
        created_by: m.created_by,
    }
}

#[async_trait]
impl SubscriptionDocumentStore for SeaOrmSubscriptionStore {
    async fn insert(&self, s: &Subscription) -> Result<(), SubscriptionError> {
        subscription::Entity::insert(to_active_model(s))
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(to_store_err)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Subscription>, SubscriptionError> {
        let model = subscription::Entity::find_by_id(id.to_string())
            .one(self.db.as_ref())
            .await
            .map_err(to_store_err)?;
        Ok(model.map(model_to_subscription))
    }

    async fn replace(&self, s: &Subscription) -> Result<(), SubscriptionError> {
        match to_active_model(s).update(self.db.as_ref()).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(SubscriptionError::NotFound { id: s.id.clone() }),
            Err(e) => Err(to_store_err(e)),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, SubscriptionError> {
        let result = subscription::Entity::delete_by_id(id.to_string())
            .exec(self.db.as_ref())
            .await
            .map_err(to_store_err)?;
        Ok(result.rows_affected > 0)
    }

    async fn search(
        &self,
        query: &SubscriptionQuery,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let mut select = subscription::Entity::find();
        if let Some(ref workflow_id) = query.workflow_id {
            select = select.filter(subscription::Column::WorkflowId.eq(workflow_id.as_str()));
        }
        if let Some(ref trigger_type) = query.trigger_type {
            select = select.filter(subscription::Column::TriggerType.eq(trigger_type.as_str()));
        }
        if let Some(ref space_id) = query.space_id {
            select = select.filter(subscription::Column::SpaceId.eq(space_id.as_str()));
        }
        if let Some(enabled) = query.enabled {
            select = select.filter(subscription::Column::Enabled.eq(enabled));
        }

        let models = select
            .order_by_asc(subscription::Column::CreatedAt)
            .order_by_asc(subscription::Column::Id)
            .limit(query.limit as u64)
            .all(self.db.as_ref())
            .await
            .map_err(to_store_err)?;

        Ok(models.into_iter().map(model_to_subscription).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sea_orm_migration::MigratorTrait;

    async fn setup() -> (SeaOrmSubscriptionStore, Arc<DatabaseConnection>) {
        let db = Arc::new(
            sea_orm::Database::connect("sqlite::memory:")
                .await
                .expect("connect"),
        );
        crate::migrations::Migrator::up(db.as_ref(), None)
            .await
            .expect("migrate");
        let store = SeaOrmSubscriptionStore::new(Arc::clone(&db));
        (store, db)
    }

    fn sub(id: &str, workflow_id: &str, age_minutes: i64) -> Subscription {
        let created = Utc::now() - Duration::minutes(age_minutes);
        Subscription {
            id: id.into(),
            workflow_id: workflow_id.into(),
            trigger_type: "external.event".into(),
            space_id: "s1".into(),
            where_clause: Some("event.source: github".into()),
            enabled: true,
            created_at: created,
            updated_at: created,
            created_by: "u1".into(),
        }
    }

    #[tokio::test]
    async fn test_insert_get() {
        let (store, _db) = setup().await;
        store.insert(&sub("s-1", "w1", 0)).await.unwrap();
        let got = store.get("s-1").await.unwrap().unwrap();
        assert_eq!(got.workflow_id, "w1");
        assert_eq!(got.where_clause.as_deref(), Some("event.source: github"));
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace() {
        let (store, _db) = setup().await;
        let mut s = sub("s-1", "w1", 0);
        store.insert(&s).await.unwrap();
        s.enabled = false;
        s.where_clause = None;
        store.replace(&s).await.unwrap();
        let got = store.get("s-1").await.unwrap().unwrap();
        assert!(!got.enabled);
        assert!(got.where_clause.is_none());

        let err = store.replace(&sub("ghost", "w1", 0)).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _db) = setup().await;
        store.insert(&sub("s-1", "w1", 0)).await.unwrap();
        assert!(store.delete("s-1").await.unwrap());
        assert!(!store.delete("s-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_search_oldest_first_with_limit() {
        let (store, _db) = setup().await;
        store.insert(&sub("new", "w1", 1)).await.unwrap();
        store.insert(&sub("old", "w1", 10)).await.unwrap();
        store.insert(&sub("other", "w2", 5)).await.unwrap();
        let mut disabled = sub("off", "w1", 20);
        disabled.enabled = false;
        store.insert(&disabled).await.unwrap();

        let found = store
            .search(&SubscriptionQuery {
                workflow_id: Some("w1".into()),
                enabled: Some(true),
                ..SubscriptionQuery::default()
            })
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "new"]);

        let limited = store
            .search(&SubscriptionQuery {
                limit: 2,
                ..SubscriptionQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, "off");
    }
}
