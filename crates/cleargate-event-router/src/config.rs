//! Tunables for the router and the emission service.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::DEFAULT_SPACE_ID;

/// Configuration for [`EventRouter`](crate::router::EventRouter) and
/// [`RouterTask`](crate::router::RouterTask).
///
/// All fields have defaults, so a partial document deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RouterConfig {
    /// Delay between cycles of the periodic task. Default: 5000.
    pub poll_interval_ms: u64,
    /// Claims older than this are reclaimed. Default: 5.
    pub stale_threshold_minutes: i64,
    /// Default: 10.
    pub reclaim_batch_size: usize,
    /// Default: 10.
    pub claim_batch_size: usize,
    /// Upper bound on subscriptions considered per event. Default: 100.
    pub subscription_page_size: usize,
    /// Per-dispatch timeout. Default: none, a hung engine call blocks the
    /// cycle.
    pub dispatch_timeout_ms: Option<u64>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            stale_threshold_minutes: 5,
            reclaim_batch_size: 10,
            claim_batch_size: 10,
            subscription_page_size: 100,
            dispatch_timeout_ms: None,
        }
    }
}

impl RouterConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn dispatch_timeout(&self) -> Option<Duration> {
        self.dispatch_timeout_ms.map(Duration::from_millis)
    }
}

/// Configuration for [`EventEmissionService`](crate::emission::EventEmissionService).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EmissionConfig {
    /// Space assigned when the request carries none. Default: `"default"`.
    pub default_space_id: String,
    /// Mint an execution credential per event when the capability exists.
    /// Default: true.
    pub mint_credentials: bool,
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            default_space_id: DEFAULT_SPACE_ID.to_string(),
            mint_credentials: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_router_config_uses_defaults() {
        let cfg: RouterConfig =
            serde_json::from_str(r#"{"claim_batch_size": 25, "dispatch_timeout_ms": 1500}"#)
                .unwrap();
        assert_eq!(cfg.claim_batch_size, 25);
        assert_eq!(cfg.reclaim_batch_size, 10);
        assert_eq!(cfg.stale_threshold_minutes, 5);
        assert_eq!(cfg.dispatch_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(RouterConfig::default().dispatch_timeout(), None);
    }

    #[test]
    fn emission_defaults() {
        let cfg: EmissionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.default_space_id, "default");
        assert!(cfg.mint_credentials);
    }
}
