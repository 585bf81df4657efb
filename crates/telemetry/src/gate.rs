//! Demo-mode gate
//!
//! The single place where the process-wide demo flag is consulted. Callers
//! publish unconditionally; the gate turns publishes into successful no-ops
//! while demo mode is on.

use std::sync::Arc;

use contracts::{Ack, ContractError, Reading, RuntimeOptions, TelemetrySink};
use tracing::trace;

/// Wraps a sink and suppresses outbound publishing in demo mode
pub struct DemoGate<S> {
    inner: S,
    options: Arc<RuntimeOptions>,
}

impl<S: TelemetrySink> DemoGate<S> {
    pub fn new(inner: S, options: Arc<RuntimeOptions>) -> Self {
        Self { inner, options }
    }
}

impl<S: TelemetrySink + Send> TelemetrySink for DemoGate<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn publish(&mut self, reading: &Reading) -> Result<Ack, ContractError> {
        if self.options.demo_mode() {
            trace!(
                sink = self.inner.name(),
                sensor_id = reading.sensor_id,
                "demo mode, publish suppressed"
            );
            return Ok(Ack::Suppressed);
        }
        self.inner.publish(reading).await
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::sinks::RecordingSink;

    fn reading() -> Reading {
        Reading {
            container_id: 1,
            device_id: 2,
            device_name: "d".to_string(),
            sensor_id: 3,
            sensor_name: "s".to_string(),
            timestamp: Utc::now(),
            value: Some(4.2),
            unit: 0,
            duplicate: false,
            sequence: 1,
        }
    }

    #[tokio::test]
    async fn test_demo_mode_suppresses_and_toggles_live() {
        let options = Arc::new(RuntimeOptions::with_demo_mode(true));
        let recorder = RecordingSink::new("rec");
        let mut gate = DemoGate::new(recorder.clone(), options.clone());

        assert_eq!(gate.publish(&reading()).await.unwrap(), Ack::Suppressed);
        assert_eq!(recorder.count(), 0);

        options.set_demo_mode(false);
        assert_eq!(gate.publish(&reading()).await.unwrap(), Ack::Delivered);
        assert_eq!(recorder.count(), 1);
        assert_eq!(gate.name(), "rec");
    }
}
