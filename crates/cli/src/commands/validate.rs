//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{ErrorDefinition, SimulationBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;
use crate::error::CliError;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    container_count: usize,
    device_count: usize,
    sensor_count: usize,
    demo_mode: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    match result.error {
        None => Ok(()),
        Some(error) => Err(CliError::config_validation(error).into()),
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            error: Some(CliError::config_not_found(&config_path).to_string()),
            config_path,
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(summarize(&blueprint)),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

fn summarize(blueprint: &SimulationBlueprint) -> ConfigSummary {
    ConfigSummary {
        version: format!("{:?}", blueprint.version),
        container_count: blueprint.containers.len(),
        device_count: blueprint.containers.iter().map(|c| c.devices.len()).sum(),
        sensor_count: blueprint.containers.iter().map(|c| c.sensor_count()).sum(),
        demo_mode: blueprint.options.demo_mode,
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &SimulationBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.containers.is_empty() {
        warnings.push("No containers configured - nothing to simulate".to_string());
    }

    for container in &blueprint.containers {
        if container.devices.is_empty() {
            warnings.push(format!(
                "Container {} ('{}') has no devices and cannot be started",
                container.id, container.name
            ));
        }
        for device in &container.devices {
            if device.sensors.is_empty() {
                warnings.push(format!(
                    "Device {} ('{}') has no sensors",
                    device.id, device.name
                ));
            }
            if device.connection_string.is_none() {
                warnings.push(format!(
                    "Device {} ('{}') has no connection string - skipped on iothub",
                    device.id, device.name
                ));
            }
            for sensor in &device.sensors {
                if let Some(ErrorDefinition::Mcar(p)) = &sensor.error_definition {
                    if p.probability >= 1.0 {
                        warnings.push(format!(
                            "Sensor {} ('{}') drops every value (mcar probability 1.0)",
                            sensor.id, sensor.name
                        ));
                    }
                }
            }
        }
    }

    if blueprint.transport.mqtt.host.is_none() {
        warnings.push("transport.mqtt.host is unset - set MQTT_BROKER_ADDRESS to use mqtt".to_string());
    }
    if blueprint.transport.iothub.host_name.is_none() {
        warnings.push("transport.iothub.host_name is unset - set IOTHUB_HOST_NAME to use iothub".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Containers: {}", summary.container_count);
            println!("  Devices: {}", summary.device_count);
            println!("  Sensors: {}", summary.sensor_count);
            println!("  Demo mode: {}", summary.demo_mode);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
