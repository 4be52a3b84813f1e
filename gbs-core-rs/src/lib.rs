//! Ground Base Station Core Library
//!
//! Coordinates a small fleet of drones over one TCP connection each:
//! assigns identities, detects failures with periodic probes and designates
//! the fittest connected drone as leader.

pub mod types;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod config;
pub mod registry;
pub mod election;
pub mod heartbeat;
pub mod acceptor;
pub mod station;
pub mod agent;

pub use types::*;
pub use error::{ChannelError, ConfigError, HandshakeError, ProtocolError};
pub use protocol::{Message, RoleAssignment};
pub use transport::{Connection, NodeChannel};
pub use config::{DroneConfig, FitnessMetric, StationConfig};
pub use registry::{NodeRecord, Registry};
pub use election::{select_leader, BroadcastReport, LeaderElector};
pub use heartbeat::{CycleReport, HeartbeatMonitor};
pub use acceptor::ConnectionAcceptor;
pub use station::Station;
pub use agent::{AgentState, NodeAgent, Phase, Telemetry};
