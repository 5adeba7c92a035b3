//! Trigger-to-workflow bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Binds events of one trigger type in one space to a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Subscription {
    pub id: String,
    pub workflow_id: String,
    pub trigger_type: String,
    pub space_id: String,
    /// Filter expression evaluated against `{ event: payload }`.
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
}

/// Parameters for [`SubscriptionRegistry::create`](crate::subscriptions::SubscriptionRegistry::create).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NewSubscription {
    pub workflow_id: String,
    pub trigger_type: String,
    pub space_id: String,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
    pub created_by: String,
}

/// Partial update. `None` fields are left unchanged; `where_clause:
/// Some(None)` removes the filter.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionUpdate {
    pub trigger_type: Option<String>,
    pub where_clause: Option<Option<String>>,
    pub enabled: Option<bool>,
}

impl SubscriptionUpdate {
    /// Whether applying this update requires re-validating the filter.
    pub fn touches_filter(&self) -> bool {
        self.trigger_type.is_some() || self.where_clause.is_some()
    }
}

/// Search criteria for subscriptions.
#[derive(Debug, Clone)]
pub struct SubscriptionQuery {
    pub workflow_id: Option<String>,
    pub trigger_type: Option<String>,
    pub space_id: Option<String>,
    pub enabled: Option<bool>,
    pub limit: usize,
}

impl Default for SubscriptionQuery {
    fn default() -> Self {
        Self {
            workflow_id: None,
            trigger_type: None,
            space_id: None,
            enabled: None,
            limit: 100,
        }
    }
}

impl SubscriptionQuery {
    pub fn matches(&self, sub: &Subscription) -> bool {
        let eq = |want: &Option<String>, have: &str| want.as_deref().is_none_or(|w| w == have);
        eq(&self.workflow_id, &sub.workflow_id)
            && eq(&self.trigger_type, &sub.trigger_type)
            && eq(&self.space_id, &sub.space_id)
            && self.enabled.is_none_or(|e| e == sub.enabled)
    }
}
