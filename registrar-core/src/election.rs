//! Bully leader election over an injectable transport.
//!
//! Node ids are ordered lexicographically; the greatest live node wins. This
//! module runs the algorithm only. Delivering probes and announcements
//! between processes is the job of an [`ElectionTransport`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ElectionConfig;
use crate::error::{RegistrarError, Result};

#[async_trait]
pub trait ElectionTransport: Send + Sync {
    /// Send an election probe to a higher node. True when it answered.
    async fn send_probe(&self, from: &str, to: &str) -> bool;

    /// Wait up to `timeout` for a leadership announcement reaching `node`.
    async fn await_response(&self, node: &str, timeout: Duration) -> Option<String>;

    async fn broadcast_leadership(&self, leader: &str, peers: &[String]);
}

/// A transport on which no probe is ever answered, so every node that runs
/// an election elects itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentTransport;

#[async_trait]
impl ElectionTransport for SilentTransport {
    async fn send_probe(&self, _from: &str, _to: &str) -> bool {
        false
    }

    async fn await_response(&self, _node: &str, _timeout: Duration) -> Option<String> {
        None
    }

    async fn broadcast_leadership(&self, _leader: &str, _peers: &[String]) {}
}

#[derive(Debug, Default)]
struct ElectionState {
    current_leader: Option<String>,
    in_progress: bool,
}

/// Clears the in-progress flag however the election future ends.
struct Running<'a>(&'a Mutex<ElectionState>);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.lock().in_progress = false;
    }
}

pub struct LeaderElection {
    node_id: String,
    // Every member, sorted, including this node
    nodes: Vec<String>,
    transport: Arc<dyn ElectionTransport>,
    state: Mutex<ElectionState>,
    config: ElectionConfig,
}

impl LeaderElection {
    pub fn new(
        node_id: impl Into<String>,
        all_nodes: impl IntoIterator<Item = String>,
        transport: Arc<dyn ElectionTransport>,
        config: ElectionConfig,
    ) -> Self {
        let node_id = node_id.into();
        let mut nodes: Vec<String> = all_nodes.into_iter().collect();
        nodes.push(node_id.clone());
        nodes.sort();
        nodes.dedup();

        Self {
            node_id,
            nodes,
            transport,
            state: Mutex::new(ElectionState::default()),
            config,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn current_leader(&self) -> Option<String> {
        self.state.lock().current_leader.clone()
    }

    pub fn is_leader(&self) -> bool {
        self.state.lock().current_leader.as_deref() == Some(self.node_id.as_str())
    }

    /// Answer a probe from `from`. Only a greater node answers.
    pub fn handle_probe(&self, from: &str) -> bool {
        self.node_id.as_str() > from
    }

    pub fn handle_announcement(&self, leader: &str) {
        tracing::info!(node_id = %self.node_id, leader, "Leader announced");
        self.state.lock().current_leader = Some(leader.to_string());
    }

    /// Run the election and return the leader this node settled on.
    ///
    /// A call made while another election is running returns the current
    /// leader (or this node) without starting a second one.
    pub async fn start_election(&self) -> Result<String> {
        let _running = {
            let mut state = self.state.lock();
            if state.in_progress {
                return Ok(state
                    .current_leader
                    .clone()
                    .unwrap_or_else(|| self.node_id.clone()));
            }
            state.in_progress = true;
            Running(&self.state)
        };

        let higher: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| n.as_str() > self.node_id.as_str())
            .cloned()
            .collect();

        if higher.is_empty() {
            return Ok(self.become_leader().await);
        }

        for round in 1..=self.config.max_rounds {
            if !self.probe(&higher).await {
                tracing::info!(node_id = %self.node_id, round, "No higher node answered");
                return Ok(self.become_leader().await);
            }

            let announced = tokio::time::timeout(
                self.config.announce_timeout,
                self.transport
                    .await_response(&self.node_id, self.config.announce_timeout),
            )
            .await
            .ok()
            .flatten();

            if let Some(leader) = announced {
                self.handle_announcement(&leader);
                return Ok(leader);
            }
            tracing::warn!(node_id = %self.node_id, round, "Higher node answered but never announced");
        }

        Err(RegistrarError::Timeout(format!(
            "no leader announced after {} election round(s)",
            self.config.max_rounds
        )))
    }

    /// Probe every higher node concurrently. True when any of them answered.
    async fn probe(&self, higher: &[String]) -> bool {
        let handles: Vec<_> = higher
            .iter()
            .map(|to| {
                let transport = self.transport.clone();
                let from = self.node_id.clone();
                let to = to.clone();
                let bound = self.config.probe_timeout;
                tokio::spawn(async move {
                    tokio::time::timeout(bound, transport.send_probe(&from, &to))
                        .await
                        .unwrap_or(false)
                })
            })
            .collect();

        let mut answered = false;
        for handle in handles {
            answered |= handle.await.unwrap_or(false);
        }
        answered
    }

    async fn become_leader(&self) -> String {
        self.state.lock().current_leader = Some(self.node_id.clone());
        let peers: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| **n != self.node_id)
            .cloned()
            .collect();
        self.transport
            .broadcast_leadership(&self.node_id, &peers)
            .await;
        tracing::info!(node_id = %self.node_id, "Elected leader");
        self.node_id.clone()
    }
}
