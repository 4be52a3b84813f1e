//! Heartbeat-based failure detection
//!
//! Every interval the monitor probes each registered drone with
//! `STATUS_CHECK` and expects `STATUS_OK` within the channel's I/O timeout.
//! A drone that fails to answer in time is removed; a slow or partitioned
//! drone is indistinguishable from a dead one. If any removed drone held the
//! leader role, exactly one re-election runs once all of the cycle's removals
//! have been applied.

use crate::election::{BroadcastReport, LeaderElector};
use crate::registry::Registry;
use crate::types::{NodeId, Role};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default time between probe cycles
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// What one probe cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Drones probed
    pub probed: usize,
    /// Drones removed as unresponsive
    pub removed: Vec<NodeId>,
    /// Whether a removed drone was the leader
    pub leader_lost: bool,
    /// Re-election triggered by the leader loss
    pub reelection: Option<BroadcastReport>,
}

/// Periodic liveness monitor
pub struct HeartbeatMonitor {
    registry: Arc<Registry>,
    elector: Arc<LeaderElector>,
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(registry: Arc<Registry>, elector: Arc<LeaderElector>, interval: Duration) -> Self {
        Self {
            registry,
            elector,
            interval,
        }
    }

    /// Probe forever. The first cycle starts one interval after the call.
    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Heartbeat: Probing drones every {:?}", self.interval);

        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    /// Run a single probe cycle
    pub async fn run_cycle(&self) -> CycleReport {
        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            debug!("Heartbeat: No drones registered");
            return CycleReport::default();
        }

        let probes = snapshot.iter().map(|node| async move {
            debug!("Heartbeat: Sending STATUS_CHECK to drone {}", node.id);
            (node, node.channel.probe().await)
        });
        let results = join_all(probes).await;

        let mut report = CycleReport {
            probed: snapshot.len(),
            ..Default::default()
        };

        for (node, result) in results {
            match result {
                Ok(Some(telemetry)) => {
                    debug!("Heartbeat: Drone {} alive (telemetry {})", node.id, telemetry);
                }
                Ok(None) => {
                    debug!("Heartbeat: Drone {} alive", node.id);
                }
                Err(e) => {
                    warn!("Heartbeat: Drone {} unresponsive: {}", node.id, e);

                    // Role is read under the same lock as the removal.
                    if let Some(removed) = self.registry.remove(node.id) {
                        removed.channel.close().await;
                        report.leader_lost |= removed.role == Role::Leader;
                        report.removed.push(node.id);
                    }
                }
            }
        }

        if report.leader_lost {
            info!("Heartbeat: Leader disconnected, selecting a new leader");
            report.reelection = self.elector.elect_leader().await;
        }

        report
    }
}
