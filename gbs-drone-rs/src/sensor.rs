//! Simulated fitness readings

use gbs_core::{Fitness, FitnessMetric, Telemetry};
use rand::Rng;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

/// Battery level range, percent
pub const BATTERY_RANGE: std::ops::RangeInclusive<Fitness> = 1..=100;

/// Signal strength range, dBm
pub const SIGNAL_RANGE: std::ops::RangeInclusive<Fitness> = -110..=-75;

/// Draw a reading for `metric`
pub fn sample<R: Rng>(metric: FitnessMetric, rng: &mut R) -> Fitness {
    match metric {
        FitnessMetric::Battery => rng.gen_range(BATTERY_RANGE),
        FitnessMetric::Signal => rng.gen_range(SIGNAL_RANGE),
    }
}

/// Re-sample the signal strength every `every`.
///
/// The station only ranks drones by the value reported at registration, so
/// these readings show up in probe replies and nowhere else.
pub fn spawn_signal_drift(telemetry: Telemetry, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let reading = sample(FitnessMetric::Signal, &mut rand::thread_rng());
            debug!("Signal strength now {} dBm", reading);
            telemetry.set(reading);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_stay_in_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            assert!(BATTERY_RANGE.contains(&sample(FitnessMetric::Battery, &mut rng)));
            assert!(SIGNAL_RANGE.contains(&sample(FitnessMetric::Signal, &mut rng)));
        }
    }

    #[tokio::test]
    async fn test_signal_drift_updates_telemetry() {
        let telemetry = Telemetry::new(0);
        let handle = spawn_signal_drift(telemetry.clone(), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(SIGNAL_RANGE.contains(&telemetry.get()));
    }
}
