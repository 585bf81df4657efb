//! Readings and their wire shape
//!
//! A [`SensorSample`] is what a sensor runner produces; the device stamps it
//! into a [`Reading`]; sinks and observers see the camelCase [`ReadingEnvelope`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContainerId, DeviceId, SensorId};

/// Output of a single sensor tick, before device stamping
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSample {
    pub sensor_id: SensorId,
    pub sensor_name: String,
    pub unit: u16,
    pub timestamp: DateTime<Utc>,
    /// `None` is a deliberately missing sample
    pub value: Option<f64>,
    /// Consumers must treat this as two identical emissions
    pub duplicate: bool,
    /// Tick number within the sensor's run (1-based)
    pub sequence: u64,
}

/// A fully stamped reading flowing from a container to its sinks
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub container_id: ContainerId,
    pub device_id: DeviceId,
    pub device_name: String,
    pub sensor_id: SensorId,
    pub sensor_name: String,
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
    pub unit: u16,
    pub duplicate: bool,
    pub sequence: u64,
}

impl Reading {
    /// Stamp a sensor sample with device and container identity
    pub fn from_sample(
        container_id: ContainerId,
        device_id: DeviceId,
        device_name: &str,
        sample: SensorSample,
    ) -> Self {
        Self {
            container_id,
            device_id,
            device_name: device_name.to_string(),
            sensor_id: sample.sensor_id,
            sensor_name: sample.sensor_name,
            timestamp: sample.timestamp,
            value: sample.value,
            unit: sample.unit,
            duplicate: sample.duplicate,
            sequence: sample.sequence,
        }
    }

    /// Number of physical emissions this reading stands for
    pub fn emissions(&self) -> usize {
        if self.duplicate {
            2
        } else {
            1
        }
    }

    /// Observer / export form, keeps the duplicate flag
    pub fn envelope(&self) -> ReadingEnvelope {
        ReadingEnvelope {
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            sensor_id: self.sensor_id,
            sensor_name: self.sensor_name.clone(),
            value: self.value,
            unit: self.unit,
            device_id: self.device_id,
            device_name: self.device_name.clone(),
            duplicate: Some(self.duplicate),
        }
    }

    /// Transport form; duplication has already happened at the sink boundary
    pub fn payload(&self) -> ReadingEnvelope {
        ReadingEnvelope {
            duplicate: None,
            ..self.envelope()
        }
    }
}

/// Reading wire shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingEnvelope {
    /// ISO-8601
    pub timestamp: String,
    pub sensor_id: SensorId,
    pub sensor_name: String,
    pub value: Option<f64>,
    pub unit: u16,
    pub device_id: DeviceId,
    pub device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
}
