//! Simulator error types

use contracts::{ContractError, SensorId};
use thiserror::Error;

use crate::RunnerState;

/// Simulator specific error
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// A tick could not produce a value
    #[error("sensor {sensor_id}: generation failed: {message}")]
    Generation { sensor_id: SensorId, message: String },

    /// Runner is not idle
    #[error("sensor {sensor_id} is busy ({state:?})")]
    Busy {
        sensor_id: SensorId,
        state: RunnerState,
    },

    /// No tokio runtime to schedule ticks on
    #[error("sensor {sensor_id}: no async runtime available")]
    NoRuntime { sensor_id: SensorId },

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl SimulatorError {
    /// Create generation error
    pub fn generation(sensor_id: SensorId, message: impl Into<String>) -> Self {
        Self::Generation {
            sensor_id,
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, SimulatorError>;
