//! In-memory workflow source, seeded by the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::errors::WorkflowStoreError;
use crate::traits::WorkflowSource;
use crate::types::WorkflowRecord;

/// Workflows keyed by `(space_id, id)`.
#[derive(Clone, Default)]
pub struct InMemoryWorkflowSource {
    workflows: Arc<RwLock<BTreeMap<(String, String), WorkflowRecord>>>,
}

impl InMemoryWorkflowSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a workflow.
    pub fn insert(&self, record: WorkflowRecord) {
        self.workflows
            .write()
            .insert((record.space_id.clone(), record.id.clone()), record);
    }
}

#[async_trait]
impl WorkflowSource for InMemoryWorkflowSource {
    async fn get(
        &self,
        workflow_id: &str,
        space_id: &str,
    ) -> Result<Option<WorkflowRecord>, WorkflowStoreError> {
        Ok(self
            .workflows
            .read()
            .get(&(space_id.to_string(), workflow_id.to_string()))
            .cloned())
    }
}
