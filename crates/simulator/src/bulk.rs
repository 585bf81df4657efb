//! Bulk generation for export
//!
//! Always uses a fresh generator so exports never disturb, or depend on,
//! a live run of the same sensor.

use chrono::{DateTime, Utc};
use contracts::{ContainerId, DeviceConfig, Reading, SensorConfig};

use crate::generator::ValueGenerator;
use crate::runner::sample;
use crate::Result;

/// Generate `n` logical readings for one sensor
///
/// Readings are timestamped `start + i * interval`. Duplicates are flagged,
/// not expanded.
pub fn generate_bulk(
    container_id: ContainerId,
    device: &DeviceConfig,
    sensor: &SensorConfig,
    n: usize,
    start: DateTime<Utc>,
    seed: Option<u64>,
) -> Result<Vec<Reading>> {
    let mut generator = match seed {
        Some(seed) => ValueGenerator::seeded(sensor, seed),
        None => ValueGenerator::new(sensor),
    };

    let values = generator.bulk(n, start, sensor.interval())?;
    Ok(values
        .into_iter()
        .map(|(timestamp, generated)| {
            Reading::from_sample(
                container_id,
                device.id,
                &device.name,
                sample(sensor, timestamp, generated),
            )
        })
        .collect())
}

/// Bulk readings for every sensor of a device, in sensor order
pub fn generate_device_bulk(
    container_id: ContainerId,
    device: &DeviceConfig,
    n: usize,
    start: DateTime<Utc>,
    seed: Option<u64>,
) -> Result<Vec<Vec<Reading>>> {
    device
        .sensors
        .iter()
        .map(|sensor| {
            let seed = seed.map(|s| s ^ u64::from(sensor.id));
            generate_bulk(container_id, device, sensor, n, start, seed)
        })
        .collect()
}
