use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::LockType;

/// A lock currently held in the lock table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock ID
    pub lock_id: String,
    /// The locked resource
    pub resource_id: String,
    pub lock_type: LockType,
    /// Who the lock is held on behalf of
    pub holder_id: String,
    /// Wall-clock acquisition time, for reporting
    pub acquired_at: DateTime<Utc>,
    /// Auto-release after this long; `None` holds until released
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Monotonic deadline derived from `timeout`
    #[serde(skip)]
    pub(crate) expires_at: Option<Instant>,
}

impl LockInfo {
    pub fn new(
        lock_id: String,
        resource_id: String,
        lock_type: LockType,
        holder_id: String,
        timeout: Option<Duration>,
        now: Instant,
    ) -> Self {
        Self {
            lock_id,
            resource_id,
            lock_type,
            holder_id,
            acquired_at: Utc::now(),
            timeout,
            expires_at: timeout.and_then(|t| now.checked_add(t)),
        }
    }

    /// Whether the timeout has elapsed at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}
