//! Coordination settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Verdict used when a gather round times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    #[default]
    Deny,
    Allow,
}

impl TimeoutPolicy {
    pub fn verdict(self) -> bool {
        matches!(self, TimeoutPolicy::Allow)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinationConfig {
    /// Upper bound on one gather round. `None` waits for every reply forever.
    pub gather_timeout: Option<Duration>,
    pub on_timeout: TimeoutPolicy,
}

impl CoordinationConfig {
    pub fn with_timeout(timeout: Duration, policy: TimeoutPolicy) -> Self {
        Self {
            gather_timeout: Some(timeout),
            on_timeout: policy,
        }
    }
}
