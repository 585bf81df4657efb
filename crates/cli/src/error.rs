//! Error types for CLI operations.

use contracts::{ContainerId, DeviceId, SensorId};
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration loaded but failed validation
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    /// Container id not present in the configuration
    #[error("Container {container_id} not found in configuration")]
    UnknownContainer { container_id: ContainerId },

    /// Device id not present in the selected container
    #[error("Device {device_id} not found in container {container_id}")]
    UnknownDevice {
        container_id: ContainerId,
        device_id: DeviceId,
    },

    /// Sensor id not present in the selection
    #[error("Sensor {sensor_id} not found in selection")]
    UnknownSensor { sensor_id: SensorId },

    /// Every requested container failed to start
    #[error("No container could be started")]
    NothingStarted,
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }
}
