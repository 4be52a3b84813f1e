//! Configuration for the station and the drones
//!
//! Both configs deserialize from JSON with every field optional; missing
//! fields take the defaults below.

use crate::error::ConfigError;
use crate::transport::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Station (coordinator) configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Address the station listens on
    pub listen_addr: SocketAddr,

    /// Listen backlog. Not an admission limit.
    pub max_nodes: u32,

    /// Time between heartbeat cycles
    pub heartbeat_interval_ms: u64,

    /// Bound on each send and each receive on a drone connection
    pub io_timeout_ms: u64,

    /// Bound on reading the registration message
    pub handshake_timeout_ms: u64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            max_nodes: 3,
            heartbeat_interval_ms: 5_000,
            io_timeout_ms: 2_000,
            handshake_timeout_ms: 2_000,
        }
    }
}

impl StationConfig {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero intervals and timeouts
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("io_timeout_ms", self.io_timeout_ms),
            ("handshake_timeout_ms", self.handshake_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
            }
        }
        Ok(())
    }

    /// Never shorter than 1ms
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms.max(1))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms.max(1))
    }

    /// Set listen address
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Set listen port, keeping the address
    pub fn with_port(mut self, port: u16) -> Self {
        self.listen_addr.set_port(port);
        self
    }

    /// Set listen backlog
    pub fn with_max_nodes(mut self, max_nodes: u32) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    /// Set heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = millis_at_least_one(interval);
        self
    }

    /// Set per-operation I/O timeout; the handshake timeout follows it
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout_ms = millis_at_least_one(timeout);
        self.handshake_timeout_ms = self.io_timeout_ms;
        self
    }
}

fn millis_at_least_one(duration: Duration) -> u64 {
    (duration.as_millis() as u64).max(1)
}

/// Which fitness metric a drone reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitnessMetric {
    /// Battery level, 1..=100
    Battery,
    /// Signal strength (RSSI), -110..=-75 dBm
    Signal,
}

impl std::fmt::Display for FitnessMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitnessMetric::Battery => write!(f, "battery"),
            FitnessMetric::Signal => write!(f, "signal"),
        }
    }
}

impl FromStr for FitnessMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "battery" => Ok(FitnessMetric::Battery),
            "signal" | "rssi" => Ok(FitnessMetric::Signal),
            other => Err(format!("unknown fitness metric: {}", other)),
        }
    }
}

/// Drone (node agent) configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DroneConfig {
    /// Station to register with
    pub station_addr: SocketAddr,

    /// Metric reported at registration
    pub metric: FitnessMetric,

    /// How often the signal variant re-samples its telemetry
    pub telemetry_refresh_secs: u64,
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            station_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            metric: FitnessMetric::Battery,
            telemetry_refresh_secs: 10,
        }
    }
}

impl DroneConfig {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry_refresh_secs == 0 {
            return Err(ConfigError::Invalid(
                "telemetry_refresh_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Never shorter than 1s
    pub fn telemetry_refresh(&self) -> Duration {
        Duration::from_secs(self.telemetry_refresh_secs.max(1))
    }
}
