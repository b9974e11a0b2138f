//! Resource-keyed lock table with READ/WRITE/EXCLUSIVE modes, timeout-based
//! expiry and per-resource version counters.
//!
//! Acquisition is fail-fast: a conflicting request returns
//! `RegistrarError::Concurrency` immediately instead of queueing. Callers that
//! want to wait wrap the call in [`LockManager::execute_with_retry`].

use nanoid::nanoid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::conflict::{CompatibilityMatrix, ConflictResult};
use crate::error::{RegistrarError, Result};
use crate::types::{LockInfo, LockType};

#[derive(Default)]
struct LockTable {
    // Map of Lock ID -> Lock
    locks: HashMap<String, LockInfo>,
    // Map of Resource ID -> Lock IDs held on it
    by_resource: HashMap<String, Vec<String>>,
    // Map of Resource ID -> optimistic version
    versions: HashMap<String, u64>,
}

impl LockTable {
    fn held_on(&self, resource_id: &str) -> Vec<&LockInfo> {
        self.by_resource
            .get(resource_id)
            .map(|ids| ids.iter().filter_map(|id| self.locks.get(id)).collect())
            .unwrap_or_default()
    }

    fn remove(&mut self, lock_id: &str) -> Option<LockInfo> {
        let info = self.locks.remove(lock_id)?;
        if let Some(ids) = self.by_resource.get_mut(&info.resource_id) {
            ids.retain(|id| id != lock_id);
            if ids.is_empty() {
                self.by_resource.remove(&info.resource_id);
            }
        }
        Some(info)
    }

    fn expired_ids<'a>(&self, candidates: impl Iterator<Item = &'a LockInfo>, now: Instant) -> Vec<String> {
        candidates
            .filter(|l| l.is_expired(now))
            .map(|l| l.lock_id.clone())
            .collect()
    }
}

/// The lock manager. Shared across engines behind an `Arc`.
#[derive(Default)]
pub struct LockManager {
    table: Mutex<LockTable>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a lock on a resource, returning its lock id.
    ///
    /// Expired locks on the resource are released first, so a timed-out
    /// holder never blocks a new acquirer even between sweeper ticks.
    pub fn acquire(
        &self,
        resource_id: &str,
        lock_type: LockType,
        holder_id: &str,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let now = Instant::now();
        let mut table = self.table.lock();

        let expired = table.expired_ids(table.held_on(resource_id).into_iter(), now);
        for id in &expired {
            if let Some(info) = table.remove(id) {
                tracing::debug!(lock_id = %info.lock_id, resource_id = %info.resource_id, holder_id = %info.holder_id, "Lock expired");
            }
        }

        let verdict = CompatibilityMatrix::check_against_locks(
            holder_id,
            lock_type,
            &table.held_on(resource_id),
        );
        if let ConflictResult::Conflict { reason, held_by } = verdict {
            tracing::debug!(resource_id, holder_id, held_by = %held_by, lock_type = %lock_type, "Lock denied");
            return Err(RegistrarError::Concurrency(reason));
        }

        let lock_id = format!("lock_{}", nanoid!());
        let info = LockInfo::new(
            lock_id.clone(),
            resource_id.to_string(),
            lock_type,
            holder_id.to_string(),
            timeout,
            now,
        );
        table.locks.insert(lock_id.clone(), info);
        table
            .by_resource
            .entry(resource_id.to_string())
            .or_default()
            .push(lock_id.clone());

        tracing::debug!(resource_id, holder_id, lock_id = %lock_id, lock_type = %lock_type, "Lock acquired");
        Ok(lock_id)
    }

    /// Release a held lock. Unknown ids return false.
    pub fn release(&self, lock_id: &str) -> bool {
        match self.table.lock().remove(lock_id) {
            Some(info) => {
                tracing::debug!(lock_id, resource_id = %info.resource_id, "Lock released");
                true
            }
            None => false,
        }
    }

    /// Acquire a lock that is released when the returned guard drops.
    pub fn scoped(
        &self,
        resource_id: &str,
        lock_type: LockType,
        holder_id: &str,
        timeout: Option<Duration>,
    ) -> Result<LockGuard<'_>> {
        let lock_id = self.acquire(resource_id, lock_type, holder_id, timeout)?;
        Ok(LockGuard {
            manager: self,
            lock_id,
        })
    }

    /// Release every lock whose timeout has elapsed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut table = self.table.lock();
        let expired = table.expired_ids(table.locks.values(), now);
        for id in &expired {
            if let Some(info) = table.remove(id) {
                tracing::info!(lock_id = %info.lock_id, resource_id = %info.resource_id, holder_id = %info.holder_id, "Expired lock released");
            }
        }
        expired.len()
    }

    /// Start a background thread that calls `sweep_expired` every `interval`.
    ///
    /// The thread only holds a weak reference and exits once the manager is
    /// gone or the returned handle is shut down.
    pub fn spawn_expiry_sweeper(self: &Arc<Self>, interval: Duration) -> ExpirySweeper {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let manager: Weak<LockManager> = Arc::downgrade(self);

        let handle = std::thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => match manager.upgrade() {
                        Some(m) => {
                            m.sweep_expired();
                        }
                        None => break,
                    },
                    // Explicit stop or handle dropped
                    _ => break,
                }
            }
        });

        ExpirySweeper {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }

    // ─── Optimistic versions ────────────────────────────────────────────────

    pub fn get_version(&self, resource_id: &str) -> u64 {
        self.table
            .lock()
            .versions
            .get(resource_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn increment_version(&self, resource_id: &str) -> u64 {
        let mut table = self.table.lock();
        let version = table.versions.entry(resource_id.to_string()).or_insert(0);
        *version += 1;
        *version
    }

    pub fn check_version(&self, resource_id: &str, expected: u64) -> bool {
        self.get_version(resource_id) == expected
    }

    /// Like `check_version`, but a mismatch is a concurrency error.
    pub fn require_version(&self, resource_id: &str, expected: u64) -> Result<()> {
        let current = self.get_version(resource_id);
        if current == expected {
            Ok(())
        } else {
            Err(RegistrarError::Concurrency(format!(
                "version mismatch on {}: expected {}, found {}",
                resource_id, expected, current
            )))
        }
    }

    /// Run `f`, retrying only on concurrency errors.
    ///
    /// Sleeps `backoff * 2^attempt` between attempts. After `max_retries`
    /// retries the last error is returned. Other errors return immediately.
    pub fn execute_with_retry<T, F>(mut f: F, max_retries: u32, backoff: Duration) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0u32;
        loop {
            match f() {
                Err(e) if e.is_concurrency() && attempt < max_retries => {
                    let delay = backoff.saturating_mul(2u32.saturating_pow(attempt));
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Retrying after concurrency error");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    // ─── Introspection ──────────────────────────────────────────────────────

    pub fn locks_on(&self, resource_id: &str) -> Vec<LockInfo> {
        self.table
            .lock()
            .held_on(resource_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn locks_held_by(&self, holder_id: &str) -> Vec<LockInfo> {
        self.table
            .lock()
            .locks
            .values()
            .filter(|l| l.holder_id == holder_id)
            .cloned()
            .collect()
    }

    pub fn active_lock_count(&self) -> usize {
        self.table.lock().locks.len()
    }
}

/// Releases its lock on drop, whichever way the scope is left.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    lock_id: String,
}

impl LockGuard<'_> {
    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.manager.release(&self.lock_id);
    }
}

/// Handle to the background expiry thread.
pub struct ExpirySweeper {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
