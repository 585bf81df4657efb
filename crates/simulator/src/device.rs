//! DeviceAggregator - fan-out of start/stop, fan-in of readings

use std::sync::Arc;

use contracts::{
    ContainerId, DeviceConfig, DeviceId, Reading, ReadingCallback, SampleCallback, SensorSource,
    TransportKind,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::runner::{SensorRunner, SensorStatus};

/// Owns the runners of one device and relays their samples upward
pub struct DeviceAggregator {
    container_id: ContainerId,
    device_id: DeviceId,
    name: Arc<str>,
    connection_string: Option<String>,
    token: CancellationToken,
    runners: Vec<SensorRunner>,
    transport: Mutex<Option<TransportKind>>,
}

impl DeviceAggregator {
    /// Build runners for every sensor; their ticks are children of `parent`
    ///
    /// With a `seed`, each sensor gets `seed ^ sensor_id` for reproducible runs.
    pub fn new(
        container_id: ContainerId,
        config: &DeviceConfig,
        parent: &CancellationToken,
        seed: Option<u64>,
    ) -> Self {
        let token = parent.child_token();
        let runners = config
            .sensors
            .iter()
            .map(|sensor| {
                let runner = SensorRunner::new(sensor.clone(), token.clone());
                match seed {
                    Some(seed) => runner.with_seed(seed ^ u64::from(sensor.id)),
                    None => runner,
                }
            })
            .collect();
        Self {
            container_id,
            device_id: config.id,
            name: Arc::from(config.name.as_str()),
            connection_string: config.connection_string.clone(),
            token,
            runners,
            transport: Mutex::new(None),
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runners(&self) -> &[SensorRunner] {
        &self.runners
    }

    fn sources(&self) -> impl Iterator<Item = &dyn SensorSource> {
        self.runners.iter().map(|runner| runner as &dyn SensorSource)
    }

    /// Transport selected for the current run
    pub fn transport(&self) -> Option<TransportKind> {
        *self.transport.lock()
    }

    /// Start every sensor, stamping readings with this device's identity
    ///
    /// A sensor that fails to start is logged and skipped; its siblings run.
    /// Returns the number of sensors started.
    pub fn start(&self, transport: TransportKind, on_reading: ReadingCallback) -> usize {
        if transport == TransportKind::Iothub && self.connection_string.is_none() {
            warn!(
                container_id = self.container_id,
                device_id = self.device_id,
                "device has no connection string, readings stay local"
            );
        }
        *self.transport.lock() = Some(transport);

        let container_id = self.container_id;
        let device_id = self.device_id;
        let device_name = self.name.clone();
        let relay: SampleCallback = Arc::new(move |sample| {
            on_reading(Reading::from_sample(
                container_id,
                device_id,
                &device_name,
                sample,
            ))
        });

        let mut started = 0;
        for source in self.sources() {
            if source.listen(relay.clone()) {
                started += 1;
            } else {
                warn!(
                    container_id,
                    device_id,
                    sensor_id = source.sensor_id(),
                    "sensor did not start"
                );
            }
        }

        info!(
            container_id,
            device_id,
            transport = %transport,
            sensors = started,
            "device started"
        );
        started
    }

    /// Request stop on every sensor; does not wait
    pub fn stop(&self) {
        for source in self.sources() {
            source.stop();
        }
        self.token.cancel();
        *self.transport.lock() = None;
        debug!(
            container_id = self.container_id,
            device_id = self.device_id,
            "device stop requested"
        );
    }

    /// Wait for every sensor task to finish
    pub async fn join(&self) {
        for runner in &self.runners {
            runner.join().await;
        }
    }

    pub fn status(&self) -> Vec<SensorStatus> {
        self.runners.iter().map(SensorRunner::status).collect()
    }
}
