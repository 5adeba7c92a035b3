//! In-memory event document store for testing and single-process use.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::EventStoreError;
use crate::traits::EventDocumentStore;
use crate::types::{Event, EventPage, EventPatch, EventQuery, Revisioned, SortOrder};

/// In-memory implementation of [`EventDocumentStore`].
///
/// Each operation takes the lock once, so a search followed by a
/// conditional update races with other callers exactly like a remote
/// document store would.
#[derive(Clone, Default)]
pub struct InMemoryEventDocumentStore {
    docs: Arc<RwLock<BTreeMap<String, Revisioned<Event>>>>,
}

impl InMemoryEventDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

#[async_trait]
impl EventDocumentStore for InMemoryEventDocumentStore {
    async fn index(&self, event: Event) -> Result<Revisioned<Event>, EventStoreError> {
        let stored = Revisioned::new(event, 1);
        self.docs
            .write()
            .await
            .insert(stored.doc.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Option<Revisioned<Event>>, EventStoreError> {
        Ok(self.docs.read().await.get(id).cloned())
    }

    async fn search(
        &self,
        query: &EventQuery,
    ) -> Result<EventPage<Revisioned<Event>>, EventStoreError> {
        let docs = self.docs.read().await;
        let mut matched: Vec<&Revisioned<Event>> =
            docs.values().filter(|r| query.matches(&r.doc)).collect();
        matched.sort_by(|a, b| {
            a.doc
                .timestamp
                .cmp(&b.doc.timestamp)
                .then_with(|| a.doc.id.cmp(&b.doc.id))
        });
        if query.sort == SortOrder::NewestFirst {
            matched.reverse();
        }
        let total = matched.len();
        let items = matched
            .into_iter()
            .skip(query.from)
            .take(query.size)
            .cloned()
            .collect();
        Ok(EventPage { items, total })
    }

    async fn update_if_revision(
        &self,
        id: &str,
        expected: u64,
        patch: &EventPatch,
    ) -> Result<Revisioned<Event>, EventStoreError> {
        let mut docs = self.docs.write().await;
        let stored = docs
            .get_mut(id)
            .ok_or_else(|| EventStoreError::NotFound { id: id.to_string() })?;
        if stored.revision != expected {
            return Err(EventStoreError::VersionConflict {
                id: id.to_string(),
                expected,
            });
        }
        patch.apply(&mut stored.doc);
        stored.revision += 1;
        Ok(stored.clone())
    }

    async fn update(
        &self,
        id: &str,
        patch: &EventPatch,
    ) -> Result<Revisioned<Event>, EventStoreError> {
        let mut docs = self.docs.write().await;
        let stored = docs
            .get_mut(id)
            .ok_or_else(|| EventStoreError::NotFound { id: id.to_string() })?;
        patch.apply(&mut stored.doc);
        stored.revision += 1;
        Ok(stored.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CredentialRef, CredentialType, EventStatus};
    use chrono::Utc;

    fn event(id: &str) -> Event {
        Event {
            id: id.into(),
            trigger_type: "t".into(),
            payload: serde_json::json!({}),
            space_id: "s".into(),
            timestamp: Utc::now(),
            status: EventStatus::Pending,
            processing_started_at: None,
            credential_ref: CredentialRef {
                credential_type: CredentialType::User,
                principal_id: "u".into(),
                api_key_id: None,
            },
        }
    }

    #[tokio::test]
    async fn conditional_update_checks_revision() {
        let store = InMemoryEventDocumentStore::new();
        let stored = store.index(event("e1")).await.unwrap();
        assert_eq!(stored.revision, 1);

        let patch = EventPatch::claim(Utc::now());
        let updated = store.update_if_revision("e1", 1, &patch).await.unwrap();
        assert_eq!(updated.revision, 2);

        let err = store.update_if_revision("e1", 1, &patch).await.unwrap_err();
        assert!(matches!(err, EventStoreError::VersionConflict { expected: 1, .. }));

        let err = store
            .update_if_revision("missing", 1, &patch)
            .await
            .unwrap_err();
        assert!(matches!(err, EventStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn unconditional_update_bumps_revision() {
        let store = InMemoryEventDocumentStore::new();
        store.index(event("e1")).await.unwrap();
        let r = store.update("e1", &EventPatch::complete()).await.unwrap();
        assert_eq!(r.revision, 2);
        assert_eq!(r.doc.status, EventStatus::Completed);
        assert_eq!(store.len().await, 1);
    }
}
