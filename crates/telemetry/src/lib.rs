//! # Telemetry
//!
//! Outbound delivery and local observation of readings.
//!
//! - `TelemetrySink` implementations: MQTT, IoT Hub (HTTPS), log, recording
//! - [`DemoGate`]: the one place demo mode is enforced
//! - [`SinkHandle`]: isolated queue + worker per sink, publishes duplicates twice
//! - [`TransportDriver`]: background connection upkeep, reports fatal errors
//! - [`LiveView`]: bounded local observer
//! - [`export`]: bulk JSON / CSV export

pub mod driver;
pub mod error;
pub mod export;
pub mod gate;
pub mod handle;
pub mod metrics;
pub mod observer;
pub mod sinks;

pub use contracts::{Ack, TelemetrySink};
pub use driver::TransportDriver;
pub use error::TelemetryError;
pub use export::{export_to_path, ExportFormat, ExportSet};
pub use gate::DemoGate;
pub use handle::{SinkForwarder, SinkHandle};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use observer::{render_line, LivePoint, LiveView, ReadingObserver};
pub use sinks::{IotHubSink, LogSink, MqttEventLoop, MqttSink, RecordingSink};
