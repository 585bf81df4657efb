//! # Contracts
//!
//! Frozen interface contracts shared by every simulator crate: entity definitions,
//! readings and their wire shape, the telemetry sink trait, lifecycle state and the
//! persistence hook. All business crates depend on this crate, never the reverse.
//!
//! ## Time Model
//! - Wall clock (`chrono::Utc`) timestamps on every reading
//! - `sequence` is the per-sensor tick number, used for ordering/diagnostics

mod blueprint;
mod entity;
mod error;
mod error_definition;
mod reading;
mod runtime;
mod sensor_source;
mod sink;
mod state;
mod transport;
mod units;

pub use blueprint::*;
pub use entity::*;
pub use error::*;
pub use error_definition::*;
pub use reading::*;
pub use runtime::RuntimeOptions;
pub use sensor_source::{ReadingCallback, SampleCallback, SensorSource};
pub use sink::*;
pub use state::*;
pub use transport::*;
pub use units::{unit_symbol, Unit, UNITS};
