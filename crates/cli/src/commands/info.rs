//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{unit_symbol, SimulationBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    demo_mode: bool,
    transport: TransportInfo,
    containers: Vec<ContainerInfo>,
}

#[derive(Serialize)]
struct TransportInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    mqtt_host: Option<String>,
    mqtt_port: u16,
    topic_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    iothub_host: Option<String>,
}

#[derive(Serialize)]
struct ContainerInfo {
    id: u32,
    name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    location: String,
    devices: Vec<DeviceInfo>,
}

#[derive(Serialize)]
struct DeviceInfo {
    id: u32,
    name: String,
    has_connection_string: bool,
    sensor_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sensors: Vec<SensorInfo>,
}

#[derive(Serialize)]
struct SensorInfo {
    id: u32,
    name: String,
    unit: String,
    base_value: f64,
    variation_range: f64,
    change_rate: f64,
    interval_secs: f64,
    error_definition: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args.sensors);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args.sensors);
    }

    Ok(())
}

fn build_config_info(blueprint: &SimulationBlueprint, with_sensors: bool) -> ConfigInfo {
    let containers = blueprint
        .containers
        .iter()
        .map(|c| ContainerInfo {
            id: c.id,
            name: c.name.clone(),
            location: c.location.clone(),
            devices: c
                .devices
                .iter()
                .map(|d| DeviceInfo {
                    id: d.id,
                    name: d.name.clone(),
                    has_connection_string: d.connection_string.is_some(),
                    sensor_count: d.sensors.len(),
                    sensors: if with_sensors {
                        d.sensors
                            .iter()
                            .map(|s| SensorInfo {
                                id: s.id,
                                name: s.name.clone(),
                                unit: unit_symbol(s.unit).to_string(),
                                base_value: s.base_value,
                                variation_range: s.variation_range,
                                change_rate: s.change_rate,
                                interval_secs: s.interval().as_secs_f64(),
                                error_definition: s
                                    .error_definition
                                    .as_ref()
                                    .map_or("no_error", |e| e.kind())
                                    .to_string(),
                            })
                            .collect()
                    } else {
                        Vec::new()
                    },
                })
                .collect(),
        })
        .collect();

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        demo_mode: blueprint.options.demo_mode,
        transport: TransportInfo {
            mqtt_host: blueprint.transport.mqtt.host.clone(),
            mqtt_port: blueprint.transport.mqtt.port,
            topic_prefix: blueprint.transport.mqtt.topic_prefix.clone(),
            iothub_host: blueprint.transport.iothub.host_name.clone(),
        },
        containers,
    }
}

fn print_config_info(blueprint: &SimulationBlueprint, with_sensors: bool) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 IoT Simulator Configuration                  ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let mqtt = &blueprint.transport.mqtt;
    println!("📡 Transport");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!(
        "   ├─ MQTT: {}:{} (topic prefix '{}')",
        mqtt.host.as_deref().unwrap_or("(unset)"),
        mqtt.port,
        mqtt.topic_prefix
    );
    println!(
        "   ├─ IoT Hub: {}",
        blueprint
            .transport
            .iothub
            .host_name
            .as_deref()
            .unwrap_or("(unset)")
    );
    println!("   └─ Demo mode: {}", blueprint.options.demo_mode);

    println!("\n📦 Containers ({})", blueprint.containers.len());
    for (i, container) in blueprint.containers.iter().enumerate() {
        let is_last = i == blueprint.containers.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!("   {} {} ({})", prefix, container.id, container.name);

        for (j, device) in container.devices.iter().enumerate() {
            let device_is_last = j == container.devices.len() - 1;
            let device_prefix = if device_is_last { "└─" } else { "├─" };
            println!(
                "   {}  {} device {} ({}) - {} sensors",
                child_prefix,
                device_prefix,
                device.id,
                device.name,
                device.sensors.len()
            );

            if with_sensors {
                let device_child = if device_is_last { "   " } else { "│  " };
                for sensor in &device.sensors {
                    println!(
                        "   {}  {}    • {} ({}) {} ±{} {}, every {:.1}s, {}",
                        child_prefix,
                        device_child,
                        sensor.id,
                        sensor.name,
                        sensor.base_value,
                        sensor.variation_range,
                        unit_symbol(sensor.unit),
                        sensor.interval().as_secs_f64(),
                        sensor
                            .error_definition
                            .as_ref()
                            .map_or("no_error", |e| e.kind())
                    );
                }
            }
        }
    }

    println!();
}
