//! Config validation
//!
//! Rules:
//! - container / device / sensor ids unique (devices and sensors globally)
//! - 0 < interval_secs <= one day, 0 < shutdown_timeout_secs <= 300
//! - variation_range >= 0, change_rate in [0, 1], values finite
//! - error definition parameters in range
//! - runtime knobs non-zero

use std::collections::HashSet;

use contracts::{
    ContractError, SensorConfig, SimulationBlueprint, MAX_INTERVAL_SECS, MAX_SHUTDOWN_TIMEOUT_SECS,
};

/// Validate a SimulationBlueprint
///
/// Returns the first error encountered.
pub fn validate(blueprint: &SimulationBlueprint) -> Result<(), ContractError> {
    validate_ids(blueprint)?;
    for container in &blueprint.containers {
        for device in &container.devices {
            for sensor in &device.sensors {
                let path = format!(
                    "containers[{}].devices[{}].sensors[{}]",
                    container.id, device.id, sensor.id
                );
                validate_sensor(&path, sensor)?;
            }
        }
    }
    validate_runtime(blueprint)?;
    Ok(())
}

fn validate_ids(blueprint: &SimulationBlueprint) -> Result<(), ContractError> {
    let mut containers = HashSet::new();
    let mut devices = HashSet::new();
    let mut sensors = HashSet::new();

    for container in &blueprint.containers {
        if !containers.insert(container.id) {
            return Err(ContractError::config_validation(
                format!("containers[id={}]", container.id),
                "duplicate container id",
            ));
        }
        for device in &container.devices {
            if !devices.insert(device.id) {
                return Err(ContractError::config_validation(
                    format!("containers[{}].devices[id={}]", container.id, device.id),
                    "duplicate device id",
                ));
            }
            for sensor in &device.sensors {
                if !sensors.insert(sensor.id) {
                    return Err(ContractError::config_validation(
                        format!(
                            "containers[{}].devices[{}].sensors[id={}]",
                            container.id, device.id, sensor.id
                        ),
                        "duplicate sensor id",
                    ));
                }
            }
        }
    }
    Ok(())
}

fn validate_sensor(path: &str, sensor: &SensorConfig) -> Result<(), ContractError> {
    if !(sensor.interval_secs.is_finite() && sensor.interval_secs > 0.0) {
        return Err(ContractError::config_validation(
            format!("{path}.interval_secs"),
            format!("interval_secs must be > 0, got {}", sensor.interval_secs),
        ));
    }
    if sensor.interval_secs > MAX_INTERVAL_SECS {
        return Err(ContractError::config_validation(
            format!("{path}.interval_secs"),
            format!(
                "interval_secs must be <= {MAX_INTERVAL_SECS}, got {}",
                sensor.interval_secs
            ),
        ));
    }
    if !sensor.base_value.is_finite() {
        return Err(ContractError::config_validation(
            format!("{path}.base_value"),
            "base_value must be finite",
        ));
    }
    if !(sensor.variation_range.is_finite() && sensor.variation_range >= 0.0) {
        return Err(ContractError::config_validation(
            format!("{path}.variation_range"),
            format!(
                "variation_range must be >= 0, got {}",
                sensor.variation_range
            ),
        ));
    }
    if !(0.0..=1.0).contains(&sensor.change_rate) {
        return Err(ContractError::config_validation(
            format!("{path}.change_rate"),
            format!("change_rate must be in [0, 1], got {}", sensor.change_rate),
        ));
    }
    if let Some(def) = &sensor.error_definition {
        def.check().map_err(|e| match e {
            ContractError::ConfigValidation { field, message } => {
                ContractError::config_validation(format!("{path}.error_definition.{field}"), message)
            }
            other => other,
        })?;
    }
    Ok(())
}

fn validate_runtime(blueprint: &SimulationBlueprint) -> Result<(), ContractError> {
    let runtime = &blueprint.runtime;
    if !(runtime.shutdown_timeout_secs.is_finite() && runtime.shutdown_timeout_secs > 0.0) {
        return Err(ContractError::config_validation(
            "runtime.shutdown_timeout_secs",
            "shutdown_timeout_secs must be > 0",
        ));
    }
    if runtime.shutdown_timeout_secs > MAX_SHUTDOWN_TIMEOUT_SECS {
        return Err(ContractError::config_validation(
            "runtime.shutdown_timeout_secs",
            format!("shutdown_timeout_secs must be <= {MAX_SHUTDOWN_TIMEOUT_SECS}"),
        ));
    }
    if runtime.sink_queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "runtime.sink_queue_capacity",
            "sink_queue_capacity cannot be 0",
        ));
    }
    if runtime.live_view_capacity == 0 {
        return Err(ContractError::config_validation(
            "runtime.live_view_capacity",
            "live_view_capacity cannot be 0",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ContainerConfig, DeviceConfig, ErrorDefinition, OptionsConfig, ProbabilityParams,
        RuntimeSettings, TransportSettings,
    };

    fn minimal_blueprint() -> SimulationBlueprint {
        SimulationBlueprint {
            version: Default::default(),
            containers: vec![ContainerConfig::new(1, "plant").with_device(
                DeviceConfig::new(1, "pump").with_sensor(
                    SensorConfig::new(1, "pressure", 3.0)
                        .with_variation_range(0.5)
                        .with_change_rate(0.2),
                ),
            )],
            transport: TransportSettings::default(),
            options: OptionsConfig::default(),
            runtime: RuntimeSettings::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&minimal_blueprint()).is_ok());
    }

    #[test]
    fn test_duplicate_container_id() {
        let mut bp = minimal_blueprint();
        let mut dup = ContainerConfig::new(1, "other");
        dup.devices.clear();
        bp.containers.push(dup);
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("duplicate container id"), "got: {err}");
    }

    #[test]
    fn test_duplicate_sensor_id_across_devices() {
        let mut bp = minimal_blueprint();
        bp.containers[0]
            .devices
            .push(DeviceConfig::new(2, "valve").with_sensor(SensorConfig::new(1, "flow", 1.0)));
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("duplicate sensor id"), "got: {err}");
    }

    #[test]
    fn test_invalid_interval() {
        let mut bp = minimal_blueprint();
        bp.containers[0].devices[0].sensors[0].interval_secs = 0.0;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("interval_secs must be > 0"), "got: {err}");
    }

    #[test]
    fn test_interval_upper_bound() {
        let mut bp = minimal_blueprint();
        bp.containers[0].devices[0].sensors[0].interval_secs = 1e20;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("interval_secs must be <="), "got: {err}");

        bp.containers[0].devices[0].sensors[0].interval_secs = MAX_INTERVAL_SECS;
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_shutdown_timeout_upper_bound() {
        let mut bp = minimal_blueprint();
        bp.runtime.shutdown_timeout_secs = 1e20;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("shutdown_timeout_secs must be <="), "got: {err}");
    }

    #[test]
    fn test_negative_variation_range() {
        let mut bp = minimal_blueprint();
        bp.containers[0].devices[0].sensors[0].variation_range = -1.0;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("variation_range"), "got: {err}");
    }

    #[test]
    fn test_error_definition_path() {
        let mut bp = minimal_blueprint();
        bp.containers[0].devices[0].sensors[0].error_definition =
            Some(ErrorDefinition::Mcar(ProbabilityParams { probability: 2.0 }));
        let err = validate(&bp).unwrap_err();
        match err {
            ContractError::ConfigValidation { field, .. } => {
                assert_eq!(field, "containers[1].devices[1].sensors[1].error_definition.mcar")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_queue_capacity() {
        let mut bp = minimal_blueprint();
        bp.runtime.sink_queue_capacity = 0;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("cannot be 0"), "got: {err}");
    }
}
