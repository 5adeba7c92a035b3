//! Durable event lifecycle: persist, claim, complete, reclaim.
//!
//! Claiming and reclamation share one pattern: read candidates with their
//! revision, then write each one conditioned on that revision. A
//! [`VersionConflict`](EventStoreError::VersionConflict) means another
//! router moved the event first, so it is skipped rather than retried.
//! There is no lock; independent router processes may race freely.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::errors::{BatchAborted, EventStoreError};
use crate::traits::EventDocumentStore;
use crate::types::{Event, EventPage, EventPatch, EventQuery, EventStatus, Revisioned, SortOrder};

/// Event lifecycle service over an [`EventDocumentStore`].
#[derive(Clone)]
pub struct EventStore {
    docs: Arc<dyn EventDocumentStore>,
}

impl EventStore {
    pub fn new(docs: Arc<dyn EventDocumentStore>) -> Self {
        Self { docs }
    }

    /// Write a new event as `Pending`. The caller guarantees a unique id.
    pub async fn persist(&self, mut event: Event) -> Result<(), EventStoreError> {
        event.status = EventStatus::Pending;
        event.processing_started_at = None;
        let stored = self.docs.index(event).await?;
        tracing::debug!(
            event_id = %stored.doc.id,
            trigger_type = %stored.doc.trigger_type,
            space_id = %stored.doc.space_id,
            "event persisted"
        );
        Ok(())
    }

    /// Claim up to `batch_size` pending events, oldest first.
    ///
    /// Returns only the events this caller won. Events claimed concurrently
    /// by someone else are skipped. Any other failure stops the batch; the
    /// events already claimed are returned inside the error.
    pub async fn claim_pending(&self, batch_size: usize) -> Result<Vec<Event>, BatchAborted> {
        let query = EventQuery {
            status: Some(EventStatus::Pending),
            size: batch_size,
            sort: SortOrder::OldestFirst,
            ..EventQuery::default()
        };
        self.transition_batch(&query, || EventPatch::claim(Utc::now()), "claimed")
            .await
    }

    /// Reset up to `batch_size` abandoned `Processing` events to `Pending`.
    ///
    /// An event is abandoned when its claim is older than
    /// `stale_threshold_minutes`, or carries no claim time at all.
    pub async fn reclaim_stale(
        &self,
        stale_threshold_minutes: i64,
        batch_size: usize,
    ) -> Result<Vec<Event>, BatchAborted> {
        let query = EventQuery {
            status: Some(EventStatus::Processing),
            stale_before: Some(Utc::now() - Duration::minutes(stale_threshold_minutes)),
            size: batch_size,
            sort: SortOrder::OldestFirst,
            ..EventQuery::default()
        };
        self.transition_batch(&query, EventPatch::release, "reclaimed")
            .await
    }

    async fn transition_batch(
        &self,
        query: &EventQuery,
        patch: impl Fn() -> EventPatch,
        action: &'static str,
    ) -> Result<Vec<Event>, BatchAborted> {
        if query.size == 0 {
            return Ok(Vec::new());
        }
        let candidates = self
            .docs
            .search(query)
            .await
            .map_err(|source| BatchAborted {
                partial: Vec::new(),
                source,
            })?;

        let mut won = Vec::with_capacity(candidates.items.len());
        for Revisioned { doc, revision } in candidates.items {
            match self
                .docs
                .update_if_revision(&doc.id, revision, &patch())
                .await
            {
                Ok(updated) => {
                    tracing::debug!(event_id = %doc.id, revision = updated.revision, "event {action}");
                    won.push(updated.doc);
                }
                Err(EventStoreError::VersionConflict { .. } | EventStoreError::NotFound { .. }) => {
                    tracing::debug!(event_id = %doc.id, "event moved concurrently, skipping");
                }
                Err(source) => {
                    tracing::error!(event_id = %doc.id, error = %source, "event transition failed");
                    return Err(BatchAborted {
                        partial: won,
                        source,
                    });
                }
            }
        }
        Ok(won)
    }

    /// Unconditionally mark an event `Completed`. Idempotent.
    pub async fn mark_completed(&self, event_id: &str) -> Result<(), EventStoreError> {
        self.docs.update(event_id, &EventPatch::complete()).await?;
        tracing::debug!(event_id = %event_id, "event completed");
        Ok(())
    }

    /// Point lookup. Absence is `Ok(None)`, not an error.
    pub async fn get_by_id(&self, event_id: &str) -> Result<Option<Event>, EventStoreError> {
        Ok(self.docs.get(event_id).await?.map(Revisioned::into_inner))
    }

    pub async fn search(&self, query: &EventQuery) -> Result<EventPage<Event>, EventStoreError> {
        let page = self.docs.search(query).await?;
        Ok(EventPage {
            items: page.items.into_iter().map(Revisioned::into_inner).collect(),
            total: page.total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::InMemoryEventDocumentStore;
    use crate::types::{CredentialRef, CredentialType};
    use chrono::DateTime;
    use serde_json::json;

    fn event(id: &str, ts: DateTime<Utc>) -> Event {
        Event {
            id: id.into(),
            trigger_type: "demo.event".into(),
            payload: json!({"a": "x"}),
            space_id: "s1".into(),
            timestamp: ts,
            status: EventStatus::Completed,
            processing_started_at: Some(ts),
            credential_ref: CredentialRef {
                credential_type: CredentialType::Service,
                principal_id: "system".into(),
                api_key_id: None,
            },
        }
    }

    fn store() -> (EventStore, Arc<InMemoryEventDocumentStore>) {
        let docs = Arc::new(InMemoryEventDocumentStore::new());
        (EventStore::new(docs.clone()), docs)
    }

    #[tokio::test]
    async fn persist_forces_pending() {
        let (store, _) = store();
        store.persist(event("e1", Utc::now())).await.unwrap();
        let stored = store.get_by_id("e1").await.unwrap().unwrap();
        assert_eq!(stored.status, EventStatus::Pending);
        assert!(stored.processing_started_at.is_none());
        assert!(store.get_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_is_oldest_first_and_bounded() {
        let (store, _) = store();
        let now = Utc::now();
        for (id, age) in [("new", 1), ("old", 30), ("mid", 10)] {
            store
                .persist(event(id, now - Duration::minutes(age)))
                .await
                .unwrap();
        }
        let claimed = store.claim_pending(2).await.unwrap();
        let ids: Vec<_> = claimed.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "mid"]);
        assert!(claimed.iter().all(|e| e.status == EventStatus::Processing
            && e.processing_started_at.is_some()));

        let rest = store.claim_pending(10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(store.claim_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_claimers_never_share_an_event() {
        let docs = Arc::new(InMemoryEventDocumentStore::new());
        let a = EventStore::new(docs.clone());
        let b = EventStore::new(docs.clone());
        let now = Utc::now();
        for i in 0..20 {
            a.persist(event(&format!("e{i}"), now - Duration::seconds(i)))
                .await
                .unwrap();
        }

        let (left, right) = tokio::join!(a.claim_pending(20), b.claim_pending(20));
        let (left, right) = (left.unwrap(), right.unwrap());
        assert_eq!(left.len() + right.len(), 20);
        assert!(left.iter().all(|l| right.iter().all(|r| r.id != l.id)));
    }

    #[tokio::test]
    async fn mark_completed_is_idempotent() {
        let (store, _) = store();
        store.persist(event("e1", Utc::now())).await.unwrap();
        store.mark_completed("e1").await.unwrap();
        store.mark_completed("e1").await.unwrap();
        let e = store.get_by_id("e1").await.unwrap().unwrap();
        assert_eq!(e.status, EventStatus::Completed);
    }

    #[tokio::test]
    async fn reclaim_only_touches_stale_claims() {
        let (store, docs) = store();
        store.persist(event("stale", Utc::now())).await.unwrap();
        store.persist(event("fresh", Utc::now())).await.unwrap();
        store.claim_pending(10).await.unwrap();
        docs.update(
            "stale",
            &EventPatch::claim(Utc::now() - Duration::minutes(6)),
        )
        .await
        .unwrap();

        let reclaimed = store.reclaim_stale(5, 10).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, "stale");
        assert_eq!(reclaimed[0].status, EventStatus::Pending);
        assert!(reclaimed[0].processing_started_at.is_none());

        // already pending: a second reclaim is a no-op
        assert!(store.reclaim_stale(5, 10).await.unwrap().is_empty());
        let fresh = store.get_by_id("fresh").await.unwrap().unwrap();
        assert_eq!(fresh.status, EventStatus::Processing);
    }

    #[tokio::test]
    async fn search_pages_newest_first() {
        let (store, _) = store();
        let now = Utc::now();
        for i in 0..5 {
            store
                .persist(event(&format!("e{i}"), now + Duration::seconds(i)))
                .await
                .unwrap();
        }
        let page = store
            .search(&EventQuery {
                size: 2,
                from: 1,
                ..EventQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        let ids: Vec<_> = page.items.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e3", "e2"]);
    }
}
