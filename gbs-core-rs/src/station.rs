//! Ground base station: wires the registry, elector, heartbeat monitor and
//! acceptor around one listening socket

use crate::acceptor::ConnectionAcceptor;
use crate::config::StationConfig;
use crate::election::LeaderElector;
use crate::heartbeat::HeartbeatMonitor;
use crate::registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinSet;
use tracing::{error, info};

/// A bound, not yet running, station
pub struct Station {
    config: StationConfig,
    registry: Arc<Registry>,
    elector: Arc<LeaderElector>,
    listener: TcpListener,
}

impl Station {
    /// Bind the listening socket with `max_nodes` as the accept backlog
    pub async fn bind(config: StationConfig) -> std::io::Result<Self> {
        let socket = if config.listen_addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(config.listen_addr)?;
        let listener = socket.listen(config.max_nodes)?;

        info!("Station: Listening on {}", listener.local_addr()?);

        let registry = Arc::new(Registry::new());
        let elector = Arc::new(LeaderElector::new(registry.clone()));

        Ok(Self {
            config,
            registry,
            elector,
            listener,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared registry, for inspection
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Run the heartbeat monitor and the accept loop until the process ends
    pub async fn run(self) {
        let monitor = HeartbeatMonitor::new(
            self.registry.clone(),
            self.elector.clone(),
            self.config.heartbeat_interval(),
        );
        let acceptor = Arc::new(ConnectionAcceptor::new(
            self.registry.clone(),
            self.elector.clone(),
            self.config.io_timeout(),
            self.config.handshake_timeout(),
        ));

        let mut tasks = JoinSet::new();
        tasks.spawn(monitor.run());
        tasks.spawn(acceptor.serve(self.listener));

        // Both tasks loop forever; getting here means one of them panicked.
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Station: Task failed: {}", e);
                tasks.abort_all();
            }
        }
    }
}
