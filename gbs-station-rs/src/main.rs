//! Ground Base Station
//!
//! Accepts drone connections, assigns identities, probes liveness and keeps
//! the fittest connected drone designated as leader.

use clap::Parser;
use gbs_core::{Station, StationConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Ground base station for a drone fleet
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen backlog
    #[arg(long)]
    max_nodes: Option<u32>,

    /// Seconds between heartbeat cycles
    #[arg(long)]
    heartbeat_secs: Option<u64>,

    /// Send/receive timeout on drone connections, in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => StationConfig::from_file(path)?,
        None => StationConfig::default(),
    };
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(max_nodes) = args.max_nodes {
        config = config.with_max_nodes(max_nodes);
    }
    if let Some(secs) = args.heartbeat_secs {
        config = config.with_heartbeat_interval(Duration::from_secs(secs));
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_io_timeout(Duration::from_secs(secs));
    }

    info!("Ground base station starting on {}", config.listen_addr);

    let station = Station::bind(config).await?;

    tokio::select! {
        _ = station.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
