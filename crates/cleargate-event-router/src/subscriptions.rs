//! Subscription registry: validated trigger-to-workflow bindings.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use uuid::Uuid;

use crate::errors::SubscriptionError;
use crate::filter::validate_filter;
use crate::registry::TriggerRegistry;
use crate::traits::{FilterEvaluator, SubscriptionDocumentStore};
use crate::types::{NewSubscription, Subscription, SubscriptionQuery, SubscriptionUpdate};

/// Default bound on subscription lookups.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Creates, validates and looks up subscriptions.
///
/// Filters are checked against the trigger's payload schema on every write
/// that touches them, so the router never sees a filter referencing a
/// property the trigger cannot carry.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    store: Arc<dyn SubscriptionDocumentStore>,
    triggers: TriggerRegistry,
    evaluator: Arc<dyn FilterEvaluator>,
    page_size: usize,
}

impl SubscriptionRegistry {
    pub fn new(
        store: Arc<dyn SubscriptionDocumentStore>,
        triggers: TriggerRegistry,
        evaluator: Arc<dyn FilterEvaluator>,
    ) -> Self {
        Self {
            store,
            triggers,
            evaluator,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Bound lookups to `page_size` results. Further pages are not fetched.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Validate and store a new, enabled subscription.
    pub async fn create(&self, params: NewSubscription) -> Result<Subscription, SubscriptionError> {
        self.validate(&params.trigger_type, params.where_clause.as_deref())?;

        let now = Utc::now();
        let subscription = Subscription {
            id: Uuid::new_v4().to_string(),
            workflow_id: params.workflow_id,
            trigger_type: params.trigger_type,
            space_id: params.space_id,
            where_clause: params.where_clause,
            enabled: true,
            created_at: now,
            updated_at: now,
            created_by: params.created_by,
        };
        self.store.insert(&subscription).await?;
        tracing::info!(
            subscription_id = %subscription.id,
            workflow_id = %subscription.workflow_id,
            trigger_type = %subscription.trigger_type,
            space_id = %subscription.space_id,
            "subscription created"
        );
        Ok(subscription)
    }

    /// Enabled subscriptions for a trigger type in a space.
    pub async fn find_active_for_trigger(
        &self,
        trigger_type: &str,
        space_id: &str,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        self.store
            .search(&SubscriptionQuery {
                trigger_type: Some(trigger_type.to_string()),
                space_id: Some(space_id.to_string()),
                enabled: Some(true),
                limit: self.page_size,
                ..SubscriptionQuery::default()
            })
            .await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Subscription>, SubscriptionError> {
        self.store.get(id).await
    }

    pub async fn find_by_workflow(
        &self,
        workflow_id: &str,
        space_id: &str,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        self.store
            .search(&SubscriptionQuery {
                workflow_id: Some(workflow_id.to_string()),
                space_id: Some(space_id.to_string()),
                limit: self.page_size,
                ..SubscriptionQuery::default()
            })
            .await
    }

    /// The subscription binding this workflow to this trigger, if any.
    /// Used to reject duplicates before creating.
    pub async fn find_existing(
        &self,
        workflow_id: &str,
        trigger_type: &str,
        space_id: &str,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        let mut found = self
            .store
            .search(&SubscriptionQuery {
                workflow_id: Some(workflow_id.to_string()),
                trigger_type: Some(trigger_type.to_string()),
                space_id: Some(space_id.to_string()),
                limit: 1,
                ..SubscriptionQuery::default()
            })
            .await?;
        Ok(found.pop())
    }

    /// Apply a partial update. The filter is re-validated when the update
    /// changes the filter or the trigger type.
    pub async fn update(
        &self,
        id: &str,
        update: SubscriptionUpdate,
    ) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| SubscriptionError::NotFound { id: id.to_string() })?;

        let touches_filter = update.touches_filter();
        if let Some(trigger_type) = update.trigger_type {
            subscription.trigger_type = trigger_type;
        }
        if let Some(where_clause) = update.where_clause {
            subscription.where_clause = where_clause;
        }
        if let Some(enabled) = update.enabled {
            subscription.enabled = enabled;
        }
        if touches_filter {
            self.validate(
                &subscription.trigger_type,
                subscription.where_clause.as_deref(),
            )?;
        }
        subscription.updated_at = Utc::now();

        self.store.replace(&subscription).await?;
        tracing::info!(subscription_id = %id, "subscription updated");
        Ok(subscription)
    }

    /// Returns whether the subscription existed.
    pub async fn delete(&self, id: &str) -> Result<bool, SubscriptionError> {
        let removed = self.store.delete(id).await?;
        if removed {
            tracing::info!(subscription_id = %id, "subscription deleted");
        }
        Ok(removed)
    }

    /// Delete every subscription of a workflow in a space.
    ///
    /// Deletes run concurrently and independently; a failure does not roll
    /// back the others. Every delete is attempted, then the first failure
    /// (if any) is returned. On success, returns the number removed.
    pub async fn delete_all_for_workflow(
        &self,
        workflow_id: &str,
        space_id: &str,
    ) -> Result<usize, SubscriptionError> {
        let subscriptions = self.find_by_workflow(workflow_id, space_id).await?;
        let results = join_all(subscriptions.iter().map(|s| self.store.delete(&s.id))).await;

        let mut removed = 0;
        let mut first_error = None;
        for (subscription, result) in subscriptions.iter().zip(results) {
            match result {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        workflow_id = %workflow_id,
                        error = %e,
                        "failed to delete subscription"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        tracing::info!(workflow_id = %workflow_id, space_id = %space_id, removed, "workflow subscriptions deleted");
        Ok(removed)
    }

    fn validate(&self, trigger_type: &str, where_clause: Option<&str>) -> Result<(), SubscriptionError> {
        let trigger = self
            .triggers
            .get(trigger_type)
            .ok_or_else(|| SubscriptionError::UnknownTrigger {
                trigger_type: trigger_type.to_string(),
            })?;
        let Some(where_clause) = where_clause else {
            return Ok(());
        };
        let schema = trigger
            .event_schema
            .as_deref()
            .ok_or_else(|| SubscriptionError::MissingSchema {
                trigger_type: trigger_type.to_string(),
            })?;
        validate_filter(where_clause, schema, self.evaluator.as_ref())
    }
}
