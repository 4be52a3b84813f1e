//! Drone-side control agent
//!
//! The agent reports its fitness once, then reacts to whatever the station
//! sends until the connection drops:
//!
//! - `ID <n>` → registered with identity `n`
//! - `ROLE_CHANGE LEADER` → local role becomes leader
//! - `ROLE_CHANGE FOLLOWER <n>` → local role becomes follower of `n`
//! - `STATUS_CHECK` → reply `STATUS_OK`, with telemetry if the drone has any
//!
//! A malformed message is logged and skipped. End of stream or a read error
//! closes the connection and ends the loop; there is no reconnect.

use crate::error::ChannelError;
use crate::protocol::{Message, RoleAssignment};
use crate::transport::Connection;
use crate::types::{Fitness, NodeId, Role};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Registration lifecycle of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unregistered,
    Registered,
    /// Terminal
    Disconnected,
}

/// Local view of the drone's place in the fleet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentState {
    pub phase: Phase,
    /// Identity assigned by the station
    pub id: Option<NodeId>,
    /// Role flag, independent of the phase
    pub role: Role,
    /// Leader named by the last role change
    pub leader_id: Option<NodeId>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            phase: Phase::Unregistered,
            id: None,
            role: Role::Follower,
            leader_id: None,
        }
    }
}

impl AgentState {
    /// Apply an inbound message; returns the reply to send, if any
    pub fn apply(&mut self, msg: Message, telemetry: Option<i64>) -> Option<Message> {
        match msg {
            Message::IdAssigned { id } => {
                info!("Agent: Assigned ID {}", id);
                self.id = Some(id);
                self.phase = Phase::Registered;
                if self.role == Role::Leader {
                    self.leader_id = Some(id);
                }
                None
            }
            Message::RoleChange(RoleAssignment::Leader) => {
                info!("Agent: Promoted to leader");
                self.role = Role::Leader;
                self.leader_id = self.id;
                None
            }
            Message::RoleChange(RoleAssignment::Follower { leader_id }) => {
                info!("Agent: Following leader {}", leader_id);
                self.role = Role::Follower;
                self.leader_id = Some(leader_id);
                None
            }
            Message::StatusCheck => {
                debug!("Agent: Received STATUS_CHECK");
                Some(Message::StatusOk { telemetry })
            }
            other => {
                warn!("Agent: Ignoring unexpected message \"{}\"", other);
                None
            }
        }
    }
}

/// Shared telemetry reading reported in probe replies
#[derive(Debug, Clone, Default)]
pub struct Telemetry(Arc<AtomicI64>);

impl Telemetry {
    pub fn new(value: i64) -> Self {
        Self(Arc::new(AtomicI64::new(value)))
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }
}

/// Drone end of a station connection
pub struct NodeAgent {
    conn: Connection,
    state: watch::Sender<AgentState>,
    telemetry: Option<Telemetry>,
}

impl NodeAgent {
    /// Connect to the station and report `fitness`
    pub async fn connect(addr: SocketAddr, fitness: Fitness) -> Result<Self, ChannelError> {
        let conn = Connection::connect(addr).await?;
        Self::register(conn, fitness).await
    }

    /// Report `fitness` over an established connection
    pub async fn register(mut conn: Connection, fitness: Fitness) -> Result<Self, ChannelError> {
        conn.send(&Message::Register { fitness }).await?;
        info!("Agent: Reported fitness {} to station at {}", fitness, conn.peer());

        let (state, _) = watch::channel(AgentState::default());
        Ok(Self {
            conn,
            state,
            telemetry: None,
        })
    }

    /// Include `telemetry` in every probe reply
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Follow state changes while the agent runs
    pub fn subscribe(&self) -> watch::Receiver<AgentState> {
        self.state.subscribe()
    }

    /// Handle inbound messages until the station goes away
    pub async fn run(mut self) -> AgentState {
        loop {
            match self.conn.recv().await {
                Ok(msg) => {
                    let telemetry = self.telemetry.as_ref().map(Telemetry::get);
                    let mut reply = None;
                    self.state
                        .send_modify(|state| reply = state.apply(msg, telemetry));

                    if let Some(reply) = reply {
                        if let Err(e) = self.conn.send(&reply).await {
                            warn!("Agent: Failed to send \"{}\": {}", reply, e);
                        }
                    }
                }
                Err(e) if !e.is_fatal() => {
                    warn!("Agent: Ignoring malformed message: {}", e);
                }
                Err(e) => {
                    info!("Agent: Disconnected from station: {}", e);
                    self.conn.close().await;
                    self.state
                        .send_modify(|state| state.phase = Phase::Disconnected);
                    break;
                }
            }
        }

        let final_state = self.state.borrow().clone();
        final_state
    }
}
