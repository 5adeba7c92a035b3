//! Foundational types for the event router.
//!
//! Every persisted type here is `Serialize + Deserialize + Debug + Clone`.
//! Maps use `BTreeMap` / `serde_json::Map` for deterministic serialization.

pub mod event;
pub mod execution;
pub mod subscription;
pub mod triggers;
pub mod workflow;

pub use event::*;
pub use execution::*;
pub use subscription::*;
pub use triggers::*;
pub use workflow::*;

use serde::{Deserialize, Serialize};

/// Space used when a request carries no tenant.
pub const DEFAULT_SPACE_ID: &str = "default";

/// Principal recorded when no authenticated identity is resolvable.
pub const SYSTEM_PRINCIPAL: &str = "system";

/// A document paired with its optimistic-concurrency revision.
///
/// Revisions increase monotonically on every write. A conditional write
/// succeeds only if the stored revision still equals the one read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revisioned<T> {
    pub doc: T,
    pub revision: u64,
}

impl<T> Revisioned<T> {
    pub fn new(doc: T, revision: u64) -> Self {
        Self { doc, revision }
    }

    pub fn into_inner(self) -> T {
        self.doc
    }
}

/// Result ordering for timestamped searches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    OldestFirst,
    #[default]
    NewestFirst,
}
