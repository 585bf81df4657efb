//! # Simulator
//!
//! Sensor value generation and scheduling.
//!
//! - [`ValueGenerator`]: bounded random walk plus an [`ErrorPolicy`]
//! - [`SensorRunner`]: one cancellable periodic task per sensor
//! - [`DeviceAggregator`]: starts/stops a device's runners and stamps readings
//! - [`bulk`]: synchronous batch generation for export
//!
//! Cancellation is structured: container token → device token → sensor token.

pub mod bulk;
mod device;
mod error;
mod error_policy;
mod generator;
mod runner;

pub use bulk::{generate_bulk, generate_device_bulk};
pub use device::DeviceAggregator;
pub use error::{Result, SimulatorError};
pub use error_policy::{ErrorPolicy, PolicyOutcome};
pub use generator::{Generated, ValueGenerator};
pub use runner::{RunnerState, SensorRunner, SensorStatus};
