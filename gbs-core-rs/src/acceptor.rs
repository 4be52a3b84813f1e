//! Connection acceptance and the registration handshake
//!
//! Handshake: the drone sends its fitness as a bare integer, the station
//! registers it, replies `ID <n>` and runs an election. Each connection is
//! handshaked by its own worker; the accept loop never waits on one.

use crate::election::LeaderElector;
use crate::error::{ChannelError, HandshakeError};
use crate::protocol::Message;
use crate::registry::Registry;
use crate::transport::{Connection, ControlStream, NodeChannel};
use crate::types::{Fitness, NodeId, Role};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Pause after a failed `accept` before retrying
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts drone connections and registers them
pub struct ConnectionAcceptor {
    registry: Arc<Registry>,
    elector: Arc<LeaderElector>,
    io_timeout: Duration,
    handshake_timeout: Duration,
}

impl ConnectionAcceptor {
    pub fn new(
        registry: Arc<Registry>,
        elector: Arc<LeaderElector>,
        io_timeout: Duration,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            elector,
            io_timeout,
            handshake_timeout,
        }
    }

    /// Accept connections forever, one supervised handshake worker each
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        let mut workers: JoinSet<(SocketAddr, Result<NodeId, HandshakeError>)> = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Acceptor: Accept failed: {}", e);
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Acceptor: Could not set TCP_NODELAY for {}: {}", addr, e);
                    }

                    info!("Acceptor: New drone connected from {}", addr);
                    let acceptor = self.clone();
                    workers.spawn(async move {
                        let result = acceptor.register(stream, addr.to_string()).await;
                        (addr, result)
                    });
                }

                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    match joined {
                        Ok((addr, Ok(id))) => debug!("Acceptor: Handshake with {} done, drone {}", addr, id),
                        Ok((addr, Err(e))) => warn!("Acceptor: Handshake with {} failed: {}", addr, e),
                        Err(e) => error!("Acceptor: Handshake worker died: {}", e),
                    }
                }
            }
        }
    }

    /// Run the registration handshake over an accepted stream.
    ///
    /// On failure the stream is closed and the registry is left as it was.
    pub async fn register<S: ControlStream + 'static>(
        &self,
        stream: S,
        peer: impl Into<String>,
    ) -> Result<NodeId, HandshakeError> {
        let mut conn = Connection::new(stream, peer);

        let fitness = match self.read_registration(&mut conn).await {
            Ok(fitness) => fitness,
            Err(e) => {
                conn.close().await;
                return Err(e);
            }
        };

        let peer = conn.peer().to_string();
        let channel = Arc::new(NodeChannel::new(conn, self.io_timeout));
        let id = self.registry.insert(fitness, channel.clone());

        if let Err(source) = channel.send(&Message::IdAssigned { id }).await {
            let removed = self.registry.remove(id);
            channel.close().await;
            // A concurrent election may have picked this drone while the send was pending.
            if removed.is_some_and(|node| node.role == Role::Leader) {
                warn!("Acceptor: Drone {} was leader when its registration failed", id);
                self.elector.elect_leader().await;
            }
            return Err(HandshakeError::IdDelivery { id, source });
        }

        info!(
            "Acceptor: Assigned ID {} to drone at {} with fitness {}",
            id, peer, fitness
        );
        self.registry.log_members();

        self.elector.elect_leader().await;
        Ok(id)
    }

    async fn read_registration(&self, conn: &mut Connection) -> Result<Fitness, HandshakeError> {
        let received = timeout(self.handshake_timeout, conn.recv())
            .await
            .map_err(|_| HandshakeError::Timeout)?;

        match received {
            Ok(Message::Register { fitness }) => Ok(fitness),
            Ok(other) => Err(HandshakeError::InvalidFitness(other.to_string())),
            Err(ChannelError::Closed) => Err(HandshakeError::Closed),
            Err(ChannelError::Protocol(e)) => Err(HandshakeError::InvalidFitness(e.to_string())),
            Err(e) => Err(HandshakeError::Read(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RoleAssignment;
    use futures_util::future::join_all;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    fn setup() -> (Arc<Registry>, ConnectionAcceptor) {
        let registry = Arc::new(Registry::new());
        let elector = Arc::new(LeaderElector::new(registry.clone()));
        let acceptor = ConnectionAcceptor::new(
            registry.clone(),
            elector,
            Duration::from_millis(200),
            Duration::from_millis(100),
        );
        (registry, acceptor)
    }

    async fn drone_sending(payload: &[u8]) -> (DuplexStream, Connection) {
        let (station, drone) = duplex(4096);
        let mut raw = drone;
        raw.write_all(&(payload.len() as u32).to_be_bytes()).await.unwrap();
        raw.write_all(payload).await.unwrap();
        (station, Connection::new(raw, "drone"))
    }

    #[tokio::test]
    async fn test_successful_registration() {
        let (registry, acceptor) = setup();
        let (station, mut drone) = drone_sending(b"75").await;

        let id = acceptor.register(station, "drone").await.unwrap();
        assert_eq!(id, 1);

        let nodes = registry.snapshot();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].fitness, 75);
        assert_eq!(nodes[0].role, Role::Leader);

        assert_eq!(drone.recv().await.unwrap(), Message::IdAssigned { id: 1 });
        assert_eq!(
            drone.recv().await.unwrap(),
            Message::RoleChange(RoleAssignment::Leader)
        );
    }

    #[tokio::test]
    async fn test_negative_fitness_is_accepted() {
        let (registry, acceptor) = setup();
        let (station, _drone) = drone_sending(b"-92").await;

        acceptor.register(station, "drone").await.unwrap();
        assert_eq!(registry.snapshot()[0].fitness, -92);
    }

    #[tokio::test]
    async fn test_non_integer_payload_is_rejected() {
        let (registry, acceptor) = setup();
        let (station, mut drone) = drone_sending(b"full").await;

        let err = acceptor.register(station, "drone").await.unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidFitness(_)));
        assert!(registry.is_empty());

        // The station hung up.
        assert!(matches!(drone.recv().await, Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_wrong_message_is_rejected() {
        let (registry, acceptor) = setup();
        let (station, _drone) = drone_sending(b"STATUS_OK").await;

        let err = acceptor.register(station, "drone").await.unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidFitness(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_closed_before_registration() {
        let (registry, acceptor) = setup();
        let (station, drone) = duplex(64);
        drop(drone);

        let err = acceptor.register(station, "drone").await.unwrap_err();
        assert!(matches!(err, HandshakeError::Closed));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_silent_connection_times_out() {
        let (registry, acceptor) = setup();
        let (station, _drone) = duplex(64);

        let err = acceptor.register(station, "drone").await.unwrap_err();
        assert!(matches!(err, HandshakeError::Timeout));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failed_id_delivery_unregisters() {
        let (registry, acceptor) = setup();
        let (station, drone) = drone_sending(b"60").await;
        drop(drone);

        let err = acceptor.register(station, "drone").await.unwrap_err();
        assert!(matches!(err, HandshakeError::IdDelivery { id: 1, .. }));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failed_id_delivery_of_leader_reelects() {
        let (registry, acceptor) = setup();

        let (station_side, drone_side) = duplex(4096);
        let mut other = Connection::new(drone_side, "other");
        let other_channel = Arc::new(NodeChannel::new(
            Connection::new(station_side, "other"),
            Duration::from_millis(200),
        ));
        let other_id = registry.insert(10, other_channel);

        // The buffer holds the registration but not the ID frame, and the
        // drone never reads, so delivering the ID times out.
        let (station, drone) = duplex(6);
        let mut raw = drone;
        raw.write_all(&2u32.to_be_bytes()).await.unwrap();
        raw.write_all(b"60").await.unwrap();

        let acceptor = Arc::new(acceptor);
        let registering = {
            let acceptor = acceptor.clone();
            tokio::spawn(async move { acceptor.register(station, "drone").await })
        };

        while registry.len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // An election running alongside the handshake picks the new drone.
        let new_id = other_id + 1;
        assert!(registry.set_role(new_id, Role::Leader));

        let err = registering.await.unwrap().unwrap_err();
        assert!(matches!(err, HandshakeError::IdDelivery { id, .. } if id == new_id));

        let nodes = registry.snapshot();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, other_id);
        assert_eq!(nodes[0].role, Role::Leader);
        assert_eq!(
            other.recv().await.unwrap(),
            Message::RoleChange(RoleAssignment::Leader)
        );
        drop(raw);
    }

    #[tokio::test]
    async fn test_concurrent_registrations_get_unique_ids() {
        let (registry, acceptor) = setup();

        let mut streams = Vec::new();
        let mut drones = Vec::new();
        for fitness in 0..8 {
            let (station, drone) = drone_sending(fitness.to_string().as_bytes()).await;
            streams.push(station);
            drones.push(drone);
        }

        let results = join_all(
            streams
                .into_iter()
                .map(|stream| acceptor.register(stream, "drone")),
        )
        .await;

        let mut ids: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=8).collect::<Vec<_>>());
        assert_eq!(registry.len(), 8);

        let leaders = registry
            .snapshot()
            .iter()
            .filter(|n| n.role == Role::Leader)
            .count();
        assert_eq!(leaders, 1);
    }
}
