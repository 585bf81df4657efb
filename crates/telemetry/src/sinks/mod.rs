//! Sink implementations
//!
//! MQTT and IoT Hub for real transports, a log sink for offline runs and a
//! recording sink for tests and embedding.

mod iothub;
mod log;
mod mqtt;
mod recording;

pub use self::iothub::{generate_sas_token, ConnectionString, IotHubSink};
pub use self::log::LogSink;
pub use self::mqtt::{MqttEventLoop, MqttSink};
pub use self::recording::RecordingSink;
