//! Runtime configuration for the kernel.
//!
//! Every section has working defaults, so an empty document (or `RegistrarConfig::default()`) is a valid configuration.
//! Durations are written in humantime form: `"1s"`, `"250ms"`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrarConfig {
    pub locks: LockConfig,
    pub enrollment: EngineLockConfig,
    pub scheduling: EngineLockConfig,
    pub coordination: CoordinationConfig,
    pub election: ElectionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// How often the background sweeper releases expired locks
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// How an engine retries acquisition of its per-resource lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineLockConfig {
    pub lock_retries: u32,
    /// Base backoff, doubled on every retry
    #[serde(with = "humantime_serde")]
    pub lock_backoff: Duration,
}

impl Default for EngineLockConfig {
    fn default() -> Self {
        Self {
            lock_retries: 3,
            lock_backoff: Duration::from_millis(10),
        }
    }
}

impl EngineLockConfig {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.lock_retries = retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.lock_backoff = backoff;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Bound on every single prepare/commit/abort call
    #[serde(with = "humantime_serde")]
    pub participant_timeout: Duration,
    /// Default bound on a whole transaction
    #[serde(with = "humantime_serde")]
    pub transaction_timeout: Duration,
    /// Poll interval of the distributed lock helper
    #[serde(with = "humantime_serde")]
    pub lock_poll_interval: Duration,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            participant_timeout: Duration::from_secs(10),
            transaction_timeout: Duration::from_secs(30),
            lock_poll_interval: Duration::from_millis(100),
        }
    }
}

impl CoordinationConfig {
    pub fn with_participant_timeout(mut self, timeout: Duration) -> Self {
        self.participant_timeout = timeout;
        self
    }

    pub fn with_lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub announce_timeout: Duration,
    /// Election rounds attempted before giving up on an announcement
    pub max_rounds: u32,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(1),
            announce_timeout: Duration::from_secs(5),
            max_rounds: 3,
        }
    }
}

impl ElectionConfig {
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_announce_timeout(mut self, timeout: Duration) -> Self {
        self.announce_timeout = timeout;
        self
    }

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }
}
