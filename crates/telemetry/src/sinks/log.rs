//! LogSink - logs every publish via tracing

use contracts::{unit_symbol, Ack, ContractError, Reading, TelemetrySink};
use tracing::{info, instrument};

/// Sink that logs readings instead of sending them anywhere
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TelemetrySink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_publish",
        skip(self, reading),
        fields(sink = %self.name, sensor_id = reading.sensor_id)
    )]
    async fn publish(&mut self, reading: &Reading) -> Result<Ack, ContractError> {
        info!(
            sink = %self.name,
            container_id = reading.container_id,
            device = %reading.device_name,
            sensor = %reading.sensor_name,
            value = ?reading.value,
            unit = unit_symbol(reading.unit),
            sequence = reading.sequence,
            "reading"
        );
        Ok(Ack::Delivered)
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
