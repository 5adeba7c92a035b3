//! Inbound events and their processing lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SortOrder;

/// Processing status of an [`Event`].
///
/// Transitions are `Pending -> Processing -> Completed`. The only backwards
/// step is reclamation, which resets a stale `Processing` claim to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the emitting principal authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    User,
    ApiKey,
    Service,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::ApiKey => "api_key",
            Self::Service => "service",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "api_key" => Some(Self::ApiKey),
            "service" => Some(Self::Service),
            _ => None,
        }
    }
}

/// An authenticated caller, as resolved from the inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Principal {
    pub id: String,
    pub credential_type: CredentialType,
    /// Set when the caller authenticated with an API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_id: Option<String>,
}

impl Principal {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            credential_type: CredentialType::User,
            api_key_id: None,
        }
    }

    /// The sentinel principal used when no identity is resolvable.
    pub fn system() -> Self {
        Self {
            id: super::SYSTEM_PRINCIPAL.to_string(),
            credential_type: CredentialType::Service,
            api_key_id: None,
        }
    }
}

/// Identity stamped on an event at emission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CredentialRef {
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    pub principal_id: String,
    /// Id of the execution credential minted for this event, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_id: Option<String>,
}

/// A durable inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Event {
    pub id: String,
    pub trigger_type: String,
    pub payload: Value,
    pub space_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
    pub credential_ref: CredentialRef,
}

/// A status transition applied to a stored event.
///
/// `processing_started_at: None` leaves the field untouched;
/// `Some(None)` clears it.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPatch {
    pub status: EventStatus,
    pub processing_started_at: Option<Option<DateTime<Utc>>>,
}

impl EventPatch {
    /// `Pending -> Processing`, stamping the claim time.
    pub fn claim(now: DateTime<Utc>) -> Self {
        Self {
            status: EventStatus::Processing,
            processing_started_at: Some(Some(now)),
        }
    }

    /// Unconditional move to `Completed`.
    pub fn complete() -> Self {
        Self {
            status: EventStatus::Completed,
            processing_started_at: None,
        }
    }

    /// `Processing -> Pending` for an abandoned claim.
    pub fn release() -> Self {
        Self {
            status: EventStatus::Pending,
            processing_started_at: Some(None),
        }
    }

    pub fn apply(&self, event: &mut Event) {
        event.status = self.status;
        if let Some(started) = self.processing_started_at {
            event.processing_started_at = started;
        }
    }
}

/// Search criteria for events. The default matches everything, newest first.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub status: Option<EventStatus>,
    pub trigger_type: Option<String>,
    pub space_id: Option<String>,
    /// Only events whose `processing_started_at` is absent or earlier than
    /// this instant.
    pub stale_before: Option<DateTime<Utc>>,
    pub size: usize,
    pub from: usize,
    pub sort: SortOrder,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            status: None,
            trigger_type: None,
            space_id: None,
            stale_before: None,
            size: 20,
            from: 0,
            sort: SortOrder::NewestFirst,
        }
    }
}

impl EventQuery {
    /// Whether `event` satisfies every filter in this query. Paging and
    /// ordering are applied by the caller.
    pub fn matches(&self, event: &Event) -> bool {
        if self.status.is_some_and(|s| s != event.status) {
            return false;
        }
        if let Some(ref t) = self.trigger_type {
            if *t != event.trigger_type {
                return false;
            }
        }
        if let Some(ref s) = self.space_id {
            if *s != event.space_id {
                return false;
            }
        }
        if let Some(cutoff) = self.stale_before {
            if event.processing_started_at.is_some_and(|t| t >= cutoff) {
                return false;
            }
        }
        true
    }
}

/// Paged search result.
#[derive(Debug, Clone)]
pub struct EventPage<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(status: EventStatus, started: Option<DateTime<Utc>>) -> Event {
        Event {
            id: "e1".into(),
            trigger_type: "demo.event".into(),
            payload: json!({"a": "x"}),
            space_id: "s1".into(),
            timestamp: Utc::now(),
            status,
            processing_started_at: started,
            credential_ref: CredentialRef {
                credential_type: CredentialType::User,
                principal_id: "u1".into(),
                api_key_id: None,
            },
        }
    }

    #[test]
    fn release_clears_started_at() {
        let mut e = event(EventStatus::Processing, Some(Utc::now()));
        EventPatch::release().apply(&mut e);
        assert_eq!(e.status, EventStatus::Pending);
        assert!(e.processing_started_at.is_none());
    }

    #[test]
    fn complete_keeps_started_at() {
        let started = Utc::now();
        let mut e = event(EventStatus::Processing, Some(started));
        EventPatch::complete().apply(&mut e);
        assert_eq!(e.status, EventStatus::Completed);
        assert_eq!(e.processing_started_at, Some(started));
    }

    #[test]
    fn stale_filter_includes_missing_started_at() {
        let q = EventQuery {
            status: Some(EventStatus::Processing),
            stale_before: Some(Utc::now()),
            ..EventQuery::default()
        };
        assert!(q.matches(&event(EventStatus::Processing, None)));
        let fresh = Utc::now() + chrono::Duration::minutes(1);
        assert!(!q.matches(&event(EventStatus::Processing, Some(fresh))));
        assert!(!q.matches(&event(EventStatus::Pending, None)));
    }

    #[test]
    fn credential_ref_serializes_type_field() {
        let r = CredentialRef {
            credential_type: CredentialType::ApiKey,
            principal_id: "p".into(),
            api_key_id: Some("k".into()),
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["type"], "api_key");
        assert_eq!(v["api_key_id"], "k");
    }
}
