//! Entity definitions: Container → Device → Sensor
//!
//! Pure configuration data. Runtime fields (current value, running flag,
//! message count) live in the simulator and orchestrator crates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ErrorDefinition;

/// Container identifier
pub type ContainerId = u32;
/// Device identifier
pub type DeviceId = u32;
/// Sensor identifier
pub type SensorId = u32;

/// Longest accepted sensor tick period (one day)
pub const MAX_INTERVAL_SECS: f64 = 86_400.0;

fn default_variation_range() -> f64 {
    1.0
}

fn default_change_rate() -> f64 {
    0.1
}

fn default_interval_secs() -> f64 {
    5.0
}

/// Sensor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Sensor unique ID
    pub id: SensorId,
    /// Display name
    pub name: String,
    /// Unit code, see [`crate::UNITS`]
    #[serde(default)]
    pub unit: u16,
    /// Center of the random walk
    pub base_value: f64,
    /// Half-width of the allowed window around `base_value`
    #[serde(default = "default_variation_range")]
    pub variation_range: f64,
    /// Max step per tick as a fraction of `variation_range`
    #[serde(default = "default_change_rate")]
    pub change_rate: f64,
    /// Tick period in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    /// Optional error injection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_definition: Option<ErrorDefinition>,
}

impl SensorConfig {
    /// Create a sensor with default walk parameters
    pub fn new(id: SensorId, name: impl Into<String>, base_value: f64) -> Self {
        Self {
            id,
            name: name.into(),
            unit: 0,
            base_value,
            variation_range: default_variation_range(),
            change_rate: default_change_rate(),
            interval_secs: default_interval_secs(),
            error_definition: None,
        }
    }

    /// Set variation range
    pub fn with_variation_range(mut self, variation_range: f64) -> Self {
        self.variation_range = variation_range;
        self
    }

    /// Set change rate
    pub fn with_change_rate(mut self, change_rate: f64) -> Self {
        self.change_rate = change_rate;
        self
    }

    /// Set tick interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_secs = interval.as_secs_f64();
        self
    }

    /// Set unit code
    pub fn with_unit(mut self, unit: u16) -> Self {
        self.unit = unit;
        self
    }

    /// Attach an error definition
    pub fn with_error(mut self, error: ErrorDefinition) -> Self {
        self.error_definition = Some(error);
        self
    }

    /// Tick period, clamped to `[1ms, MAX_INTERVAL_SECS]`
    pub fn interval(&self) -> Duration {
        let floor = Duration::from_millis(1);
        if self.interval_secs.is_nan() || self.interval_secs <= 0.0 {
            return floor;
        }
        Duration::try_from_secs_f64(self.interval_secs.min(MAX_INTERVAL_SECS))
            .map_or(floor, |d| d.max(floor))
    }

    /// Allowed value window `(low, high)` around the configured base value
    pub fn bounds(&self) -> (f64, f64) {
        (
            self.base_value - self.variation_range,
            self.base_value + self.variation_range,
        )
    }
}

/// Device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device unique ID
    pub id: DeviceId,
    /// Display name
    pub name: String,
    /// IoT Hub device connection string (`HostName=…;DeviceId=…;SharedAccessKey=…`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    /// Owned sensors, in order
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

impl DeviceConfig {
    pub fn new(id: DeviceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            connection_string: None,
            sensors: Vec::new(),
        }
    }

    /// Append a sensor
    pub fn with_sensor(mut self, sensor: SensorConfig) -> Self {
        self.sensors.push(sensor);
        self
    }
}

/// Container configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Container unique ID
    pub id: ContainerId,
    /// Display name, also the MQTT topic suffix
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    /// Owned devices, in order
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl ContainerConfig {
    pub fn new(id: ContainerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            location: String::new(),
            devices: Vec::new(),
        }
    }

    /// Append a device
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.devices.push(device);
        self
    }

    /// Total sensors across all devices
    pub fn sensor_count(&self) -> usize {
        self.devices.iter().map(|d| d.sensors.len()).sum()
    }
}
