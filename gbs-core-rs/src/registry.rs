//! Membership registry
//!
//! Single source of truth for each drone's identity, fitness and role.
//! Every mutation takes the registry lock, and the lock is only ever held for
//! an in-memory change or copy. Components that talk to drones take a
//! [`Registry::snapshot`], release the lock, do their I/O against the copy
//! and come back to apply whatever removals or role changes they found.

use crate::transport::NodeChannel;
use crate::types::{Fitness, NodeId, Role};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// A registered drone
#[derive(Clone)]
pub struct NodeRecord {
    pub id: NodeId,
    pub fitness: Fitness,
    pub role: Role,
    pub channel: Arc<NodeChannel>,
}

impl fmt::Debug for NodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRecord")
            .field("id", &self.id)
            .field("fitness", &self.fitness)
            .field("role", &self.role)
            .field("peer", &self.channel.peer())
            .finish()
    }
}

struct Members {
    /// Registration order
    nodes: Vec<NodeRecord>,
    next_id: NodeId,
}

/// Thread-safe store of registered drones
pub struct Registry {
    members: Mutex<Members>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            members: Mutex::new(Members {
                nodes: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Register a drone as a follower and assign it the next identity
    pub fn insert(&self, fitness: Fitness, channel: Arc<NodeChannel>) -> NodeId {
        let mut members = self.members.lock();
        let id = members.next_id;
        members.next_id += 1;
        members.nodes.push(NodeRecord {
            id,
            fitness,
            role: Role::Follower,
            channel,
        });
        info!(
            "Registry: Registered drone {} (fitness {}, {} members)",
            id,
            fitness,
            members.nodes.len()
        );
        id
    }

    /// Copy of every record in registration order
    pub fn snapshot(&self) -> Vec<NodeRecord> {
        self.members.lock().nodes.clone()
    }

    /// Remove a drone. Removing an absent id is a no-op.
    ///
    /// Returns the removed record so the caller can close its channel and see
    /// whether it held the leader role at the moment of removal.
    pub fn remove(&self, id: NodeId) -> Option<NodeRecord> {
        let mut members = self.members.lock();
        let index = members.nodes.iter().position(|n| n.id == id)?;
        let record = members.nodes.remove(index);
        info!(
            "Registry: Removed drone {} ({}, {} members left)",
            id,
            record.role,
            members.nodes.len()
        );
        Some(record)
    }

    /// Set the role of a registered drone. Returns false if it is gone.
    pub fn set_role(&self, id: NodeId, role: Role) -> bool {
        let mut members = self.members.lock();
        match members.nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => {
                node.role = role;
                true
            }
            None => false,
        }
    }

    /// Whether `id` is registered and currently the leader
    pub fn was_leader(&self, id: NodeId) -> bool {
        self.members
            .lock()
            .nodes
            .iter()
            .any(|n| n.id == id && n.role == Role::Leader)
    }

    /// Current leader, if one is designated
    pub fn leader(&self) -> Option<NodeId> {
        self.members
            .lock()
            .nodes
            .iter()
            .find(|n| n.role == Role::Leader)
            .map(|n| n.id)
    }

    pub fn len(&self) -> usize {
        self.members.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dump the member table at debug level
    pub fn log_members(&self) {
        let nodes = self.snapshot();
        debug!("Registry: Current drones:");
        for node in &nodes {
            debug!(
                "  id={} fitness={} role={} peer={}",
                node.id,
                node.fitness,
                node.role,
                node.channel.peer()
            );
        }
    }
}
