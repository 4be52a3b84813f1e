//! Leader election and role broadcast.
//!
//! Election is not a consensus protocol. The leader is a pure function of a
//! registry snapshot: the drone with the highest fitness wins, and on a tie
//! the earliest-registered drone keeps the lead (strictly-greater comparison
//! during a scan in registration order). There is no term or epoch; drones
//! trust the most recent `ROLE_CHANGE` they receive.
//!
//! Rounds are serialized: two triggers that arrive together (a registration
//! and a heartbeat removal, say) run back-to-back, so each drone receives the
//! assignments of consecutive rounds in order.

use crate::protocol::{Message, RoleAssignment};
use crate::registry::Registry;
use crate::types::{Fitness, NodeId};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of one role broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub leader_id: NodeId,
    /// Drones that received their assignment, in registration order
    pub delivered: Vec<NodeId>,
    /// Drones removed because the send failed
    pub dropped: Vec<NodeId>,
}

/// Pick the leader among `(id, fitness)` candidates given in registration order
pub fn select_leader<I>(candidates: I) -> Option<NodeId>
where
    I: IntoIterator<Item = (NodeId, Fitness)>,
{
    let mut best: Option<(NodeId, Fitness)> = None;

    for (id, fitness) in candidates {
        match best {
            Some((_, best_fitness)) if fitness <= best_fitness => {}
            _ => best = Some((id, fitness)),
        }
    }

    best.map(|(id, _)| id)
}

/// Runs elections over the registry and notifies every drone of its role
pub struct LeaderElector {
    registry: Arc<Registry>,
    round: Mutex<()>,
}

impl LeaderElector {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            round: Mutex::new(()),
        }
    }

    /// Elect a leader from the current membership and broadcast the result.
    ///
    /// Returns `None` when no drone is registered.
    pub async fn elect_leader(&self) -> Option<BroadcastReport> {
        let _round = self.round.lock().await;

        let snapshot = self.registry.snapshot();
        let Some(leader_id) = select_leader(snapshot.iter().map(|n| (n.id, n.fitness))) else {
            info!("Election: No drones connected, skipping leader selection");
            return None;
        };

        info!(
            "Election: Drone {} selected as leader among {} drones",
            leader_id,
            snapshot.len()
        );

        Some(self.broadcast_locked(leader_id).await)
    }

    /// Send every registered drone its role under `leader_id`
    pub async fn broadcast_role(&self, leader_id: NodeId) -> BroadcastReport {
        let _round = self.round.lock().await;
        self.broadcast_locked(leader_id).await
    }

    async fn broadcast_locked(&self, leader_id: NodeId) -> BroadcastReport {
        let snapshot = self.registry.snapshot();

        let sends = snapshot.iter().map(|node| {
            let assignment = RoleAssignment::for_node(node.id, leader_id);
            async move {
                let result = node.channel.send(&Message::RoleChange(assignment)).await;
                (node, assignment, result)
            }
        });
        let results = join_all(sends).await;

        let mut report = BroadcastReport {
            leader_id,
            delivered: Vec::with_capacity(results.len()),
            dropped: Vec::new(),
        };

        for (node, assignment, result) in results {
            match result {
                Ok(()) => {
                    debug!("Election: Drone {} is now {}", node.id, assignment.role());
                    self.registry.set_role(node.id, assignment.role());
                    report.delivered.push(node.id);
                }
                Err(e) => {
                    warn!(
                        "Election: Failed to send ROLE_CHANGE to drone {}: {}. Removing it.",
                        node.id, e
                    );
                    if let Some(removed) = self.registry.remove(node.id) {
                        removed.channel.close().await;
                    }
                    report.dropped.push(node.id);
                }
            }
        }

        report
    }
}
