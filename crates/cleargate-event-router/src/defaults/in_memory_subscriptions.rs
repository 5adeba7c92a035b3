//! In-memory subscription store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::SubscriptionError;
use crate::traits::SubscriptionDocumentStore;
use crate::types::{Subscription, SubscriptionQuery};

/// In-memory implementation of [`SubscriptionDocumentStore`].
#[derive(Clone, Default)]
pub struct InMemorySubscriptionStore {
    docs: Arc<RwLock<BTreeMap<String, Subscription>>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionDocumentStore for InMemorySubscriptionStore {
    async fn insert(&self, subscription: &Subscription) -> Result<(), SubscriptionError> {
        self.docs
            .write()
            .await
            .insert(subscription.id.clone(), subscription.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Subscription>, SubscriptionError> {
        Ok(self.docs.read().await.get(id).cloned())
    }

    async fn replace(&self, subscription: &Subscription) -> Result<(), SubscriptionError> {
        let mut docs = self.docs.write().await;
        match docs.get_mut(&subscription.id) {
            Some(existing) => {
                *existing = subscription.clone();
                Ok(())
            }
            None => Err(SubscriptionError::NotFound {
                id: subscription.id.clone(),
            }),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, SubscriptionError> {
        Ok(self.docs.write().await.remove(id).is_some())
    }

    async fn search(
        &self,
        query: &SubscriptionQuery,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let docs = self.docs.read().await;
        let mut matched: Vec<Subscription> = docs
            .values()
            .filter(|s| query.matches(s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        matched.truncate(query.limit);
        Ok(matched)
    }
}
