//! Core types shared by the station and the drones

use serde::{Deserialize, Serialize};

/// Identity assigned by the station. Starts at 1 and is never reused.
pub type NodeId = u64;

/// Scalar used to rank drones for leadership (battery level or signal strength).
///
/// Signed because signal strength is reported in negative dBm.
pub type Fitness = i64;

/// Role of a drone in the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Follows the current leader
    Follower,
    /// Highest-fitness drone, designated by the station
    Leader,
}

impl Default for Role {
    fn default() -> Self {
        Role::Follower
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Follower => write!(f, "follower"),
            Role::Leader => write!(f, "leader"),
        }
    }
}
