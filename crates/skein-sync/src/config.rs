use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Limit for one whole fan-out operation.
    pub timeout_ms: u64,
    /// Limit for a single replica's share of an operation.
    pub replica_timeout_ms: u64,
    /// How long resolved avatars and usernames stay cached.
    pub cache_ttl_secs: u64,
}

impl SyncConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn replica_timeout(&self) -> Duration {
        Duration::from_millis(self.replica_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 25_000,
            replica_timeout_ms: 10_000,
            cache_ttl_secs: 24 * 60 * 60,
        }
    }
}
