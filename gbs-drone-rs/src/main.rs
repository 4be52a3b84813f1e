//! Drone node
//!
//! Registers with the ground base station, reports its fitness and follows
//! the role assignments it receives until the station goes away.

mod sensor;

use clap::Parser;
use gbs_core::{DroneConfig, FitnessMetric, NodeAgent, Telemetry};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Drone that joins a ground base station fleet
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Station address
    #[arg(short, long)]
    station: Option<SocketAddr>,

    /// Fitness metric to report (battery, signal)
    #[arg(short, long)]
    metric: Option<FitnessMetric>,

    /// Report this fitness instead of a random reading
    #[arg(short, long, allow_negative_numbers = true)]
    fitness: Option<i64>,

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
        Some(path) => DroneConfig::from_file(path)?,
        None => DroneConfig::default(),
    };
    if let Some(addr) = args.station {
        config.station_addr = addr;
    }
    if let Some(metric) = args.metric {
        config.metric = metric;
    }

    let fitness = args
        .fitness
        .unwrap_or_else(|| sensor::sample(config.metric, &mut rand::thread_rng()));
    info!("Drone starting with {} {}", config.metric, fitness);

    let mut agent = NodeAgent::connect(config.station_addr, fitness).await?;

    if config.metric == FitnessMetric::Signal {
        let telemetry = Telemetry::new(fitness);
        let _drift = sensor::spawn_signal_drift(telemetry.clone(), config.telemetry_refresh());
        agent = agent.with_telemetry(telemetry);
    }

    let final_state = agent.run().await;
    info!(
        "Drone stopped (id {:?}, last role {})",
        final_state.id, final_state.role
    );

    Ok(())
}
