//! `export` command implementation.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use contracts::{ContainerConfig, Reading, SimulationBlueprint};
use telemetry::ExportFormat;
use tracing::info;

use crate::cli::ExportArgs;
use crate::error::CliError;

/// Execute the `export` command
pub fn run_export(args: &ExportArgs) -> Result<()> {
    info!(config = %args.config.display(), container_id = args.container, "Exporting readings");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let start = args.start.unwrap_or_else(Utc::now);
    let readings = generate(&blueprint, args, start)?;
    let format = ExportFormat::from(args.format);
    let rows = telemetry::export_to_path(&readings, format, &args.out)
        .with_context(|| format!("Failed to write {}", args.out.display()))?;

    info!(
        readings = readings.len(),
        rows,
        format = %format,
        out = %args.out.display(),
        "Export complete"
    );
    println!(
        "Wrote {} readings ({} rows) to {}",
        readings.len(),
        rows,
        args.out.display()
    );
    Ok(())
}

/// Bulk readings for the selected container / device / sensor
fn generate(
    blueprint: &SimulationBlueprint,
    args: &ExportArgs,
    start: DateTime<Utc>,
) -> Result<Vec<Reading>> {
    let container = blueprint
        .container(args.container)
        .ok_or(CliError::UnknownContainer {
            container_id: args.container,
        })?;
    check_selection(container, args)?;

    let mut readings = Vec::new();
    for device in container
        .devices
        .iter()
        .filter(|d| args.device.map_or(true, |id| d.id == id))
    {
        for sensor in device
            .sensors
            .iter()
            .filter(|s| args.sensor.map_or(true, |id| s.id == id))
        {
            let seed = args.seed.map(|s| s ^ u64::from(sensor.id));
            let batch = simulator::bulk::generate_bulk(
                container.id,
                device,
                sensor,
                args.count,
                start,
                seed,
            )
            .with_context(|| format!("Failed to generate readings for sensor {}", sensor.id))?;
            readings.extend(batch);
        }
    }
    Ok(readings)
}

fn check_selection(container: &ContainerConfig, args: &ExportArgs) -> Result<()> {
    if let Some(device_id) = args.device {
        if !container.devices.iter().any(|d| d.id == device_id) {
            return Err(CliError::UnknownDevice {
                container_id: container.id,
                device_id,
            }
            .into());
        }
    }
    if let Some(sensor_id) = args.sensor {
        let found = container
            .devices
            .iter()
            .filter(|d| args.device.map_or(true, |id| d.id == id))
            .any(|d| d.sensors.iter().any(|s| s.id == sensor_id));
        if !found {
            return Err(CliError::UnknownSensor { sensor_id }.into());
        }
    }
    Ok(())
}
