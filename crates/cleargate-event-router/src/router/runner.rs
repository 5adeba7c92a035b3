//! Periodic driver for [`EventRouter::run_cycle`].

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::EventRouter;

/// Totals reported when a [`RouterTask`] stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub cycles: u64,
    pub failed_cycles: u64,
}

/// Runs router cycles on a fixed interval until shutdown.
///
/// Cycles are awaited inline, so a slow cycle delays the next tick instead
/// of overlapping it. A failed cycle is logged and retried on the next tick.
pub struct RouterTask {
    router: EventRouter,
    interval: Duration,
}

impl RouterTask {
    pub fn new(router: EventRouter) -> Self {
        let interval = router.config().poll_interval();
        Self { router, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn [`run`](Self::run) on the tokio runtime.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<TaskStats> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> TaskStats {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = TaskStats::default();

        tracing::info!(interval_ms = self.interval.as_millis() as u64, "router task started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    stats.cycles += 1;
                    if let Err(e) = self.router.run_cycle().await {
                        stats.failed_cycles += 1;
                        tracing::error!(error = %e, "router cycle failed, retrying next tick");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!(cycles = stats.cycles, "router task stopping");
                    break;
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::emission::RequestContext;
    use crate::errors::EventStoreError;
    use crate::pipeline::EventPipelineBuilder;
    use crate::testing::RecordingExecutionEngine;
    use crate::traits::EventDocumentStore;
    use crate::types::{Event, EventPage, EventPatch, EventQuery, EventStatus, Revisioned};

    #[tokio::test]
    async fn routes_events_until_shutdown() {
        let pipeline = EventPipelineBuilder::new()
            .execution_engine(Arc::new(RecordingExecutionEngine::new()))
            .build()
            .unwrap();
        let receipt = pipeline
            .emitter
            .emit(
                "external.event",
                json!({"source": "github", "event_type": "push"}),
                &RequestContext::new(),
            )
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = pipeline
            .router_task()
            .with_interval(Duration::from_millis(10))
            .spawn(shutdown_rx);

        let mut completed = false;
        for _ in 0..200 {
            let event = pipeline.events.get_by_id(&receipt.event_id).await.unwrap();
            if event.is_some_and(|e| e.status == EventStatus::Completed) {
                completed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(completed, "event should be completed by the task");

        shutdown_tx.send(()).expect("send shutdown");
        let stats = handle.await.unwrap();
        assert!(stats.cycles >= 1);
        assert_eq!(stats.failed_cycles, 0);
    }

    /// A store whose searches always fail.
    struct BrokenStore;

    #[async_trait]
    impl EventDocumentStore for BrokenStore {
        async fn index(&self, event: Event) -> Result<Revisioned<Event>, EventStoreError> {
            Ok(Revisioned::new(event, 1))
        }
        async fn get(&self, _id: &str) -> Result<Option<Revisioned<Event>>, EventStoreError> {
            Ok(None)
        }
        async fn search(
            &self,
            _query: &EventQuery,
        ) -> Result<EventPage<Revisioned<Event>>, EventStoreError> {
            Err(EventStoreError::Store {
                message: "unreachable".into(),
            })
        }
        async fn update_if_revision(
            &self,
            id: &str,
            _expected: u64,
            _patch: &EventPatch,
        ) -> Result<Revisioned<Event>, EventStoreError> {
            Err(EventStoreError::NotFound { id: id.into() })
        }
        async fn update(
            &self,
            id: &str,
            _patch: &EventPatch,
        ) -> Result<Revisioned<Event>, EventStoreError> {
            Err(EventStoreError::NotFound { id: id.into() })
        }
    }

    #[tokio::test]
    async fn failed_cycles_do_not_stop_the_task() {
        let pipeline = EventPipelineBuilder::new()
            .event_documents(Arc::new(BrokenStore))
            .execution_engine(Arc::new(RecordingExecutionEngine::new()))
            .build()
            .unwrap();
        assert!(pipeline.router.run_cycle().await.is_err());

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = pipeline
            .router_task()
            .with_interval(Duration::from_millis(5))
            .spawn(shutdown_rx);
        tokio::time::sleep(Duration::from_millis(40)).await;
        shutdown_tx.send(()).expect("send shutdown");

        let stats = handle.await.unwrap();
        assert!(stats.cycles >= 2);
        assert_eq!(stats.cycles, stats.failed_cycles);
    }
}
