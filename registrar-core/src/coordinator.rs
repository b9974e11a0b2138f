//! Two-phase commit across registered participants, and a polling
//! distributed lock emulated on top of the local lock manager.
//!
//! Commit is best-effort. When some participants commit and another fails,
//! the operation ends ABORTED, the failed participants receive `abort`, and
//! the ones that already committed are listed in
//! [`CoordinationResult::committed`]. No compensation is sent to them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nanoid::nanoid;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::CoordinationConfig;
use crate::error::{RegistrarError, Result};
use crate::infrastructure::{DomainEvent, EventSink, EventType, NoopEventSink};
use crate::lock_manager::LockManager;
use crate::types::LockType;

/// One side of a distributed transaction.
///
/// A `false` return, an elapsed per-call timeout and a panic are all treated
/// as a negative vote.
#[async_trait]
pub trait Participant: Send + Sync {
    async fn prepare(&self, operation_id: &str, data: &Value) -> bool;
    async fn commit(&self, operation_id: &str) -> bool;
    async fn abort(&self, operation_id: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinationStatus {
    Pending,
    InProgress,
    Committed,
    Aborted,
    Timeout,
}

impl CoordinationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted | Self::Timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Prepare,
    Commit,
    Abort,
    Done,
}

#[derive(Debug, Clone, Copy)]
enum Call {
    Prepare,
    Commit,
    Abort,
}

#[derive(Debug, Clone)]
pub struct CoordinationOperation {
    pub operation_id: String,
    pub participants: Vec<String>,
    pub phase: Phase,
    pub status: CoordinationStatus,
    pub started_at: DateTime<Utc>,
    pub start: Instant,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationResult {
    pub success: bool,
    pub status: CoordinationStatus,
    pub message: String,
    /// Votes of the last phase that ran
    pub participant_results: BTreeMap<String, bool>,
    pub operation_id: String,
    /// Participants whose commit succeeded, even when the operation aborted
    pub committed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationStatistics {
    pub coordinator_id: String,
    pub registered_participants: usize,
    pub total_operations: usize,
    pub committed: usize,
    pub aborted: usize,
    pub timed_out: usize,
}

pub struct TransactionCoordinator {
    coordinator_id: String,
    participants: RwLock<HashMap<String, Arc<dyn Participant>>>,
    // Map of Operation ID -> record
    operations: Mutex<HashMap<String, CoordinationOperation>>,
    events: Arc<dyn EventSink>,
    config: CoordinationConfig,
}

impl TransactionCoordinator {
    pub fn new(coordinator_id: impl Into<String>) -> Self {
        Self {
            coordinator_id: coordinator_id.into(),
            participants: RwLock::new(HashMap::new()),
            operations: Mutex::new(HashMap::new()),
            events: Arc::new(NoopEventSink),
            config: CoordinationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CoordinationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    pub fn register_participant(&self, participant_id: impl Into<String>, participant: Arc<dyn Participant>) {
        self.participants
            .write()
            .insert(participant_id.into(), participant);
    }

    pub fn unregister_participant(&self, participant_id: &str) -> bool {
        self.participants.write().remove(participant_id).is_some()
    }

    /// Run a transaction over `participants` bounded by `timeout` as a whole.
    ///
    /// Never fails: every outcome, including a timeout, is encoded in the
    /// returned result.
    pub async fn execute(&self, participants: &[String], data: Value, timeout: Duration) -> CoordinationResult {
        let operation_id = format!("op_{}", nanoid!());
        self.operations.lock().insert(
            operation_id.clone(),
            CoordinationOperation {
                operation_id: operation_id.clone(),
                participants: participants.to_vec(),
                phase: Phase::Prepare,
                status: CoordinationStatus::Pending,
                started_at: Utc::now(),
                start: Instant::now(),
                timeout,
            },
        );

        let data = Arc::new(data);
        let result = match tokio::time::timeout(timeout, self.run(&operation_id, participants, &data)).await {
            Ok(result) => result,
            Err(_) => {
                let phase = self.operation(&operation_id).map(|op| op.phase);
                tracing::warn!(operation_id = %operation_id, phase = ?phase, "Transaction timed out");
                if phase == Some(Phase::Prepare) {
                    self.call_all(&operation_id, participants, Call::Abort, &data).await;
                }
                self.finish(&operation_id, CoordinationStatus::Timeout);
                CoordinationResult {
                    success: false,
                    status: CoordinationStatus::Timeout,
                    message: "Transaction timed out".to_string(),
                    participant_results: BTreeMap::new(),
                    operation_id: operation_id.clone(),
                    committed: Vec::new(),
                }
            }
        };

        self.events.publish(DomainEvent::new(
            EventType::Coordination,
            format!("coordination:{}", operation_id),
            json!({
                "operation_id": result.operation_id,
                "status": result.status,
                "participants": participants,
                "committed": result.committed,
            }),
        ));
        result
    }

    async fn run(&self, operation_id: &str, participants: &[String], data: &Arc<Value>) -> CoordinationResult {
        self.update(operation_id, |op| op.status = CoordinationStatus::InProgress);

        let prepared = self.call_all(operation_id, participants, Call::Prepare, data).await;
        if !prepared.values().all(|ok| *ok) {
            self.update(operation_id, |op| op.phase = Phase::Abort);
            let refused: Vec<&String> = prepared.iter().filter(|(_, ok)| !**ok).map(|(id, _)| id).collect();
            tracing::warn!(operation_id, refused = ?refused, "Prepare failed, aborting");
            self.call_all(operation_id, participants, Call::Abort, data).await;
            self.finish(operation_id, CoordinationStatus::Aborted);
            return CoordinationResult {
                success: false,
                status: CoordinationStatus::Aborted,
                message: "Transaction aborted due to prepare failures".to_string(),
                participant_results: prepared,
                operation_id: operation_id.to_string(),
                committed: Vec::new(),
            };
        }

        self.update(operation_id, |op| op.phase = Phase::Commit);
        let commits = self.call_all(operation_id, participants, Call::Commit, data).await;
        let (committed, failed): (Vec<String>, Vec<String>) = {
            let (ok, failed): (Vec<_>, Vec<_>) = commits.iter().partition(|(_, ok)| **ok);
            (
                ok.into_iter().map(|(id, _)| id.clone()).collect(),
                failed.into_iter().map(|(id, _)| id.clone()).collect(),
            )
        };

        if failed.is_empty() {
            self.finish(operation_id, CoordinationStatus::Committed);
            tracing::info!(operation_id, participants = participants.len(), "Transaction committed");
            return CoordinationResult {
                success: true,
                status: CoordinationStatus::Committed,
                message: "Transaction committed successfully".to_string(),
                participant_results: commits,
                operation_id: operation_id.to_string(),
                committed,
            };
        }

        self.update(operation_id, |op| op.phase = Phase::Abort);
        tracing::warn!(operation_id, failed = ?failed, committed = ?committed, "Commit failed on some participants");
        self.call_all(operation_id, &failed, Call::Abort, data).await;
        self.finish(operation_id, CoordinationStatus::Aborted);
        CoordinationResult {
            success: false,
            status: CoordinationStatus::Aborted,
            message: format!(
                "Transaction aborted due to commit failures; {} participant(s) already committed",
                committed.len()
            ),
            participant_results: commits,
            operation_id: operation_id.to_string(),
            committed,
        }
    }

    /// Calls every participant concurrently, each bounded by the per-call timeout.
    async fn call_all(
        &self,
        operation_id: &str,
        participant_ids: &[String],
        call: Call,
        data: &Arc<Value>,
    ) -> BTreeMap<String, bool> {
        let per_call = self.config.participant_timeout;
        let mut handles = Vec::with_capacity(participant_ids.len());
        {
            let registered = self.participants.read();
            for id in participant_ids {
                let Some(participant) = registered.get(id).cloned() else {
                    tracing::warn!(operation_id, participant_id = %id, "Unknown participant");
                    handles.push((id.clone(), None));
                    continue;
                };
                let op = operation_id.to_string();
                let data = data.clone();
                let handle = tokio::spawn(async move {
                    let fut = async {
                        match call {
                            Call::Prepare => participant.prepare(&op, &data).await,
                            Call::Commit => participant.commit(&op).await,
                            Call::Abort => participant.abort(&op).await,
                        }
                    };
                    tokio::time::timeout(per_call, fut).await.unwrap_or(false)
                });
                handles.push((id.clone(), Some(handle)));
            }
        }

        let mut results = BTreeMap::new();
        for (id, handle) in handles {
            let vote = match handle {
                Some(handle) => match handle.await {
                    Ok(vote) => vote,
                    Err(e) => {
                        tracing::warn!(operation_id, participant_id = %id, call = ?call, error = %e, "Participant call failed");
                        false
                    }
                },
                None => false,
            };
            results.insert(id, vote);
        }
        results
    }

    fn update(&self, operation_id: &str, f: impl FnOnce(&mut CoordinationOperation)) {
        if let Some(op) = self.operations.lock().get_mut(operation_id) {
            f(op);
        }
    }

    fn finish(&self, operation_id: &str, status: CoordinationStatus) {
        self.update(operation_id, |op| {
            op.status = status;
            op.phase = Phase::Done;
        });
    }

    pub fn operation(&self, operation_id: &str) -> Option<CoordinationOperation> {
        self.operations.lock().get(operation_id).cloned()
    }

    pub fn operation_status(&self, operation_id: &str) -> Option<CoordinationStatus> {
        self.operations.lock().get(operation_id).map(|op| op.status)
    }

    /// Drop operation records older than `max_age`, whatever their status.
    pub fn cleanup_old_operations(&self, max_age: Duration) -> usize {
        let mut operations = self.operations.lock();
        let before = operations.len();
        operations.retain(|_, op| op.start.elapsed() <= max_age);
        let removed = before - operations.len();
        if removed > 0 {
            tracing::info!(removed, "Old coordination operations purged");
        }
        removed
    }

    pub fn statistics(&self) -> CoordinationStatistics {
        let operations = self.operations.lock();
        let count = |status: CoordinationStatus| operations.values().filter(|op| op.status == status).count();
        CoordinationStatistics {
            coordinator_id: self.coordinator_id.clone(),
            registered_participants: self.participants.read().len(),
            total_operations: operations.len(),
            committed: count(CoordinationStatus::Committed),
            aborted: count(CoordinationStatus::Aborted),
            timed_out: count(CoordinationStatus::Timeout),
        }
    }
}

/// Lock held on behalf of a whole node, acquired by polling the lock manager.
pub struct DistributedLock {
    node_id: String,
    locks: Arc<LockManager>,
    // Map of Resource ID -> Lock ID held by this node
    held: Mutex<HashMap<String, String>>,
    poll_interval: Duration,
}

impl DistributedLock {
    pub fn new(node_id: impl Into<String>, locks: Arc<LockManager>, config: &CoordinationConfig) -> Self {
        Self {
            node_id: node_id.into(),
            locks,
            held: Mutex::new(HashMap::new()),
            poll_interval: config.lock_poll_interval,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Poll until the resource is exclusively ours or `timeout` elapses.
    /// Already holding it succeeds immediately.
    pub async fn acquire(&self, resource_id: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                // Check, acquire and record under one guard so concurrent
                // callers on this handle never take the resource twice
                let mut held = self.held.lock();
                if held.contains_key(resource_id) {
                    return Ok(());
                }
                match self
                    .locks
                    .acquire(resource_id, LockType::Exclusive, &self.node_id, None)
                {
                    Ok(lock_id) => {
                        held.insert(resource_id.to_string(), lock_id);
                        tracing::debug!(node_id = %self.node_id, resource_id, "Distributed lock acquired");
                        return Ok(());
                    }
                    Err(e) if e.is_concurrency() => {}
                    Err(e) => return Err(e),
                }
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(RegistrarError::Timeout(format!(
                    "distributed lock on {} not acquired within {:?}",
                    resource_id, timeout
                )));
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    pub fn release(&self, resource_id: &str) -> bool {
        match self.held.lock().remove(resource_id) {
            Some(lock_id) => self.locks.release(&lock_id),
            None => false,
        }
    }

    /// Resources currently held by this node, sorted.
    pub fn held(&self) -> Vec<String> {
        let mut resources: Vec<String> = self.held.lock().keys().cloned().collect();
        resources.sort();
        resources
    }
}
