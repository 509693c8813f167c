use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the vote ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Maximum read-decide-write attempts per vote before giving up with
    /// `Contended`. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Deadline applied to vote calls that do not carry their own, in
    /// milliseconds. `None` disables it.
    pub default_timeout_ms: Option<u64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            default_timeout_ms: None,
        }
    }
}

impl LedgerConfig {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}
