//! ContainerOrchestrator - lifecycle of one container's run
//!
//! `Inactive → Starting → Active → Stopping → Inactive`, with `Error` reached
//! from `Starting`/`Active` when the transport fails. Every run gets a fresh
//! epoch; reading callbacks carry the epoch they were created under and are
//! dropped once the container has moved past it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use contracts::{
    ContainerConfig, ContainerId, ContainerSnapshot, ContainerState, NullStore, Reading,
    ReadingCallback, RuntimeOptions, RuntimeSettings, StateStore, TelemetrySink, TransportKind,
    TransportSettings,
};
use observability::{ReadingStatsAggregator, ReadingSummary};
use parking_lot::Mutex;
use simulator::{DeviceAggregator, SensorStatus};
use telemetry::{
    DemoGate, IotHubSink, LiveView, LogSink, MetricsSnapshot, MqttSink, ReadingObserver,
    SinkHandle, SinkMetrics, TelemetryError, TransportDriver,
};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::{OrchestratorError, Result};

/// Fence value when no run accepts readings
const FENCE_CLOSED: u64 = 0;

/// Time a transport gets to flush its disconnect before being cancelled
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

/// How a `stop()` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Background task finished within the shutdown bound
    Stopped { message_count: u64 },
    /// Bound expired; container marked inactive while the task unwinds
    ForcedReclaim { message_count: u64 },
    /// Nothing was running
    AlreadyInactive,
}

impl StopOutcome {
    pub fn message_count(&self) -> Option<u64> {
        match self {
            StopOutcome::Stopped { message_count }
            | StopOutcome::ForcedReclaim { message_count } => Some(*message_count),
            StopOutcome::AlreadyInactive => None,
        }
    }
}

#[derive(Debug, Default)]
struct Status {
    state: ContainerState,
    is_active: bool,
    start_time: Option<DateTime<Utc>>,
    epoch: u64,
    last_error: Option<String>,
}

/// State shared between the orchestrator, its run task and reading callbacks
struct Shared {
    container_id: ContainerId,
    name: String,
    status: Mutex<Status>,
    message_count: AtomicU64,
    fence: AtomicU64,
    live: LiveView,
    stats: Mutex<ReadingStatsAggregator>,
    store: Arc<dyn StateStore>,
    watch: watch::Sender<ContainerSnapshot>,
}

impl Shared {
    fn new(config: &ContainerConfig, live_capacity: usize, store: Arc<dyn StateStore>) -> Self {
        let status = Status::default();
        let initial = ContainerSnapshot {
            container_id: config.id,
            name: config.name.clone(),
            state: status.state,
            is_active: false,
            start_time: None,
            message_count: 0,
            epoch: 0,
            last_error: None,
        };
        let (watch, _) = watch::channel(initial);
        Self {
            container_id: config.id,
            name: config.name.clone(),
            status: Mutex::new(status),
            message_count: AtomicU64::new(0),
            fence: AtomicU64::new(FENCE_CLOSED),
            live: LiveView::new(live_capacity),
            stats: Mutex::new(ReadingStatsAggregator::new()),
            store,
            watch,
        }
    }

    fn snapshot_of(&self, status: &Status) -> ContainerSnapshot {
        ContainerSnapshot {
            container_id: self.container_id,
            name: self.name.clone(),
            state: status.state,
            is_active: status.is_active,
            start_time: status.start_time,
            message_count: self.message_count.load(Ordering::Acquire),
            epoch: status.epoch,
            last_error: status.last_error.clone(),
        }
    }

    fn snapshot(&self) -> ContainerSnapshot {
        self.snapshot_of(&self.status.lock())
    }

    /// Apply `change`; when it reports a transition, save and broadcast
    ///
    /// Runs under the status lock so observers see transitions in order.
    fn transition(&self, change: impl FnOnce(&mut Status) -> bool) -> bool {
        let mut status = self.status.lock();
        if !change(&mut status) {
            return false;
        }
        let snapshot = self.snapshot_of(&status);
        if let Err(e) = self.store.save(&snapshot) {
            error!(
                container_id = self.container_id,
                state = %snapshot.state,
                error = %e,
                "failed to persist container state"
            );
        }
        debug!(
            container_id = self.container_id,
            state = %snapshot.state,
            epoch = snapshot.epoch,
            "container state changed"
        );
        self.watch.send_replace(snapshot);
        true
    }

    /// Open a new epoch and enter `Starting`
    fn begin(&self) -> u64 {
        self.message_count.store(0, Ordering::Release);
        self.stats.lock().reset();
        self.live.clear();

        let mut epoch = FENCE_CLOSED;
        self.transition(|s| {
            s.epoch += 1;
            s.state = ContainerState::Starting;
            s.is_active = true;
            s.start_time = Some(Utc::now());
            s.last_error = None;
            epoch = s.epoch;
            true
        });
        self.fence.store(epoch, Ordering::Release);
        epoch
    }

    /// Count and observe one logical reading, if its epoch is still live
    fn accept(&self, epoch: u64, reading: Reading) -> Option<Reading> {
        if self.fence.load(Ordering::Acquire) != epoch {
            trace!(
                container_id = self.container_id,
                epoch,
                sensor_id = reading.sensor_id,
                "reading from a finished run dropped"
            );
            return None;
        }
        self.message_count.fetch_add(1, Ordering::AcqRel);
        observability::record_reading(&reading);
        self.stats.lock().update(&reading);
        self.live.observe(&reading);
        Some(reading)
    }

    /// Enter `Error` if the failing run is still the current one
    fn fail(&self, epoch: u64, message: &str) -> bool {
        let failed = self.transition(|s| {
            if s.epoch != epoch
                || !matches!(s.state, ContainerState::Starting | ContainerState::Active)
            {
                return false;
            }
            s.state = ContainerState::Error;
            s.is_active = false;
            s.start_time = None;
            s.last_error = Some(message.to_string());
            true
        });
        if failed {
            self.fence.store(FENCE_CLOSED, Ordering::Release);
        }
        failed
    }
}

/// Everything owned by one activation
struct ActiveRun {
    epoch: u64,
    transport: TransportKind,
    token: CancellationToken,
    devices: Arc<Vec<DeviceAggregator>>,
    task: JoinHandle<()>,
}

/// Drives one container's devices and its transport
pub struct ContainerOrchestrator {
    config: ContainerConfig,
    transport: TransportSettings,
    runtime: RuntimeSettings,
    options: Arc<RuntimeOptions>,
    seed: Option<u64>,
    shared: Arc<Shared>,
    run: Option<ActiveRun>,
    sink: Option<(String, Arc<SinkMetrics>)>,
}

impl ContainerOrchestrator {
    pub fn new(
        config: ContainerConfig,
        transport: TransportSettings,
        runtime: RuntimeSettings,
        options: Arc<RuntimeOptions>,
    ) -> Self {
        let shared = Arc::new(Shared::new(
            &config,
            runtime.live_view_capacity,
            Arc::new(NullStore),
        ));
        Self {
            config,
            transport,
            runtime,
            options,
            seed: None,
            shared,
            run: None,
            sink: None,
        }
    }

    /// Persist every lifecycle transition to `store`
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.shared = Arc::new(Shared::new(
            &self.config,
            self.runtime.live_view_capacity,
            store,
        ));
        self
    }

    /// Reproducible sensor values across runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn id(&self) -> ContainerId {
        self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn state(&self) -> ContainerState {
        self.shared.status.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.shared.status.lock().is_active
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.shared.status.lock().start_time
    }

    /// Logical readings delivered since the last activation
    pub fn message_count(&self) -> u64 {
        self.shared.message_count.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ContainerSnapshot {
        self.shared.snapshot()
    }

    /// Receive a snapshot at every state transition
    ///
    /// `message_count` in broadcast snapshots is as of the transition.
    pub fn subscribe(&self) -> watch::Receiver<ContainerSnapshot> {
        self.shared.watch.subscribe()
    }

    /// Local observer; never affected by demo mode
    pub fn live_view(&self) -> &LiveView {
        &self.shared.live
    }

    pub fn reading_summary(&self) -> ReadingSummary {
        self.shared.stats.lock().summary()
    }

    /// Transport of the current run
    pub fn transport(&self) -> Option<TransportKind> {
        self.run.as_ref().map(|run| run.transport)
    }

    /// Sink name and counters of the current or most recent run
    pub fn sink_metrics(&self) -> Option<(String, MetricsSnapshot)> {
        self.sink
            .as_ref()
            .map(|(name, metrics)| (name.clone(), metrics.snapshot()))
    }

    pub fn sensor_status(&self) -> Vec<SensorStatus> {
        self.run
            .as_ref()
            .map(|run| run.devices.iter().flat_map(|d| d.status()).collect())
            .unwrap_or_default()
    }

    /// Connect the selected transport and start every device
    ///
    /// # Errors
    /// - `AlreadyActive` while a run is in progress
    /// - `NoDevices` for an empty container
    /// - `TransportNotConfigured` for IoT Hub without a host name
    /// - `TransportConnect` when the MQTT broker is missing or refuses
    ///
    /// State is untouched on error.
    #[instrument(
        name = "container_start",
        skip(self),
        fields(container_id = self.config.id, transport = %kind)
    )]
    pub async fn start(&mut self, kind: TransportKind) -> Result<()> {
        self.prepare().await?;
        let (handle, driver) = self.connect(kind).await?;
        self.launch(kind, handle, driver).await;
        Ok(())
    }

    /// Start with a caller-supplied sink instead of a real transport
    ///
    /// The sink is still wrapped in the demo-mode gate.
    #[instrument(
        name = "container_start_with_sink",
        skip(self, sink),
        fields(container_id = self.config.id, transport = %kind, sink = sink.name())
    )]
    pub async fn start_with_sink<S>(&mut self, kind: TransportKind, sink: S) -> Result<()>
    where
        S: TelemetrySink + Send + 'static,
    {
        self.prepare().await?;
        let handle = SinkHandle::spawn(
            DemoGate::new(sink, Arc::clone(&self.options)),
            self.runtime.sink_queue_capacity,
        );
        self.launch(kind, handle, TransportDriver::idle()).await;
        Ok(())
    }

    async fn prepare(&mut self) -> Result<()> {
        let state = self.state();
        if !state.can_start() {
            return Err(OrchestratorError::AlreadyActive {
                container_id: self.config.id,
                state,
            });
        }
        if let Some(run) = self.run.take() {
            debug!(container_id = self.config.id, "reclaiming errored run");
            self.reclaim(run).await;
        }
        if self.config.devices.is_empty() {
            return Err(OrchestratorError::NoDevices {
                container_id: self.config.id,
            });
        }
        Ok(())
    }

    async fn connect(&self, kind: TransportKind) -> Result<(SinkHandle, TransportDriver)> {
        let capacity = self.runtime.sink_queue_capacity;
        let options = Arc::clone(&self.options);
        let map_err =
            |e: TelemetryError| OrchestratorError::from_transport(self.config.id, kind, e);

        match kind {
            TransportKind::Mqtt => {
                let (sink, event_loop) =
                    MqttSink::connect(self.config.id, &self.config.name, &self.transport.mqtt)
                        .await
                        .map_err(map_err)?;
                Ok((
                    SinkHandle::spawn(DemoGate::new(sink, options), capacity),
                    TransportDriver::spawn_mqtt(event_loop),
                ))
            }
            TransportKind::Iothub => {
                let sink = IotHubSink::new(&self.config, &self.transport.iothub).map_err(map_err)?;
                if sink.device_count() == 0 {
                    warn!(
                        container_id = self.config.id,
                        "no device has IoT Hub credentials, every reading will be skipped"
                    );
                }
                Ok((
                    SinkHandle::spawn(DemoGate::new(sink, options), capacity),
                    TransportDriver::idle(),
                ))
            }
            TransportKind::Log => {
                let sink = LogSink::new(format!("log:{}", self.config.name));
                Ok((
                    SinkHandle::spawn(DemoGate::new(sink, options), capacity),
                    TransportDriver::idle(),
                ))
            }
        }
    }

    async fn launch(&mut self, kind: TransportKind, handle: SinkHandle, driver: TransportDriver) {
        let container_id = self.config.id;
        let epoch = self.shared.begin();
        observability::record_container_active(true);

        let token = CancellationToken::new();
        let devices: Arc<Vec<DeviceAggregator>> = Arc::new(
            self.config
                .devices
                .iter()
                .map(|device| DeviceAggregator::new(container_id, device, &token, self.seed))
                .collect(),
        );

        let forwarder = handle.forwarder();
        let callback_shared = Arc::clone(&self.shared);
        let on_reading: ReadingCallback = Arc::new(move |reading| {
            if let Some(reading) = callback_shared.accept(epoch, reading) {
                forwarder.send(reading);
            }
        });

        let sink_name = handle.name().to_string();
        let sink_metrics = Arc::clone(handle.metrics());
        let (ready_tx, ready_rx) = oneshot::channel();
        let task = tokio::spawn(run_container(RunContext {
            shared: Arc::clone(&self.shared),
            epoch,
            transport: kind,
            devices: Arc::clone(&devices),
            token: token.clone(),
            on_reading,
            handle,
            driver,
            ready: ready_tx,
        }));

        let sensors = ready_rx.await.unwrap_or(0);
        if sensors == 0 {
            warn!(container_id, "no sensor started");
        }

        self.shared.transition(|s| {
            if s.epoch != epoch || s.state != ContainerState::Starting {
                return false;
            }
            s.state = ContainerState::Active;
            true
        });

        info!(
            container_id,
            epoch,
            transport = %kind,
            sink = %sink_name,
            devices = devices.len(),
            sensors,
            "container active"
        );

        self.sink = Some((sink_name, sink_metrics));
        self.run = Some(ActiveRun {
            epoch,
            transport: kind,
            token,
            devices,
            task,
        });
    }

    /// Stop every device and wait, bounded, for the run to wind down
    ///
    /// The container is reported inactive when this returns even if the
    /// background task had to be abandoned.
    #[instrument(name = "container_stop", skip(self), fields(container_id = self.config.id))]
    pub async fn stop(&mut self) -> StopOutcome {
        let Some(run) = self.run.take() else {
            return StopOutcome::AlreadyInactive;
        };

        let epoch = run.epoch;
        let stopping = self.shared.transition(|s| {
            if s.epoch != epoch
                || !matches!(s.state, ContainerState::Starting | ContainerState::Active)
            {
                return false;
            }
            s.state = ContainerState::Stopping;
            true
        });
        if !stopping {
            // The run already ended in Error; only its task is left.
            self.reclaim(run).await;
            return StopOutcome::AlreadyInactive;
        }
        self.shared.fence.store(FENCE_CLOSED, Ordering::Release);

        let forced = self.reclaim(run).await;
        let message_count = self.message_count();

        self.shared.transition(|s| {
            s.state = ContainerState::Inactive;
            s.is_active = false;
            s.start_time = None;
            true
        });
        observability::record_container_active(false);

        info!(
            container_id = self.config.id,
            epoch,
            message_count,
            forced,
            "container stopped"
        );

        if forced {
            StopOutcome::ForcedReclaim { message_count }
        } else {
            StopOutcome::Stopped { message_count }
        }
    }

    /// Signal the run and join its task within the shutdown bound
    ///
    /// Returns true when the bound expired and the task was aborted.
    async fn reclaim(&self, run: ActiveRun) -> bool {
        for device in run.devices.iter() {
            device.stop();
        }
        run.token.cancel();

        let bound = self.runtime.shutdown_timeout();
        let mut task = run.task;
        match tokio::time::timeout(bound, &mut task).await {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                error!(container_id = self.config.id, error = ?e, "container task panicked");
                false
            }
            Err(_) => {
                task.abort();
                warn!(
                    container_id = self.config.id,
                    timeout_secs = bound.as_secs_f64(),
                    "container task did not finish in time; reclaimed while in-flight work unwinds"
                );
                observability::record_forced_shutdown(self.config.id);
                true
            }
        }
    }
}

impl Drop for ContainerOrchestrator {
    fn drop(&mut self) {
        if let Some(run) = self.run.as_ref() {
            self.shared.fence.store(FENCE_CLOSED, Ordering::Release);
            for device in run.devices.iter() {
                device.stop();
            }
            run.token.cancel();
        }
    }
}

struct RunContext {
    shared: Arc<Shared>,
    epoch: u64,
    transport: TransportKind,
    devices: Arc<Vec<DeviceAggregator>>,
    token: CancellationToken,
    on_reading: ReadingCallback,
    handle: SinkHandle,
    driver: TransportDriver,
    ready: oneshot::Sender<usize>,
}

/// Background context of one run
///
/// Blocks only on the stop signal or a transport failure, never on ticks.
async fn run_container(ctx: RunContext) {
    let RunContext {
        shared,
        epoch,
        transport,
        devices,
        token,
        on_reading,
        handle,
        mut driver,
        ready,
    } = ctx;

    let sensors: usize = devices
        .iter()
        .map(|device| device.start(transport, Arc::clone(&on_reading)))
        .sum();
    drop(on_reading);
    let _ = ready.send(sensors);

    tokio::select! {
        biased;
        _ = token.cancelled() => {
            debug!(container_id = shared.container_id, epoch, "stop signalled");
        }
        message = driver.failed() => {
            error!(
                container_id = shared.container_id,
                epoch,
                error = %message,
                "transport failed, stopping devices"
            );
            for device in devices.iter() {
                device.stop();
            }
            if shared.fail(epoch, &message) {
                observability::record_container_failure(shared.container_id);
                observability::record_container_active(false);
            }
        }
    }

    for device in devices.iter() {
        device.join().await;
    }
    handle.shutdown().await;
    driver.shutdown(DISCONNECT_GRACE).await;
    debug!(container_id = shared.container_id, epoch, "run finished");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use contracts::{
        Ack, AnomalyParams, ContractError, DeviceConfig, ErrorDefinition, MemoryStore,
        ProbabilityParams, SensorConfig,
    };
    use telemetry::RecordingSink;
    use tokio::time::Instant;

    use super::*;

    fn container(devices: Vec<DeviceConfig>) -> ContainerConfig {
        let mut config = ContainerConfig::new(1, "plant");
        config.devices = devices;
        config
    }

    fn temperature_device(error: Option<ErrorDefinition>) -> DeviceConfig {
        let mut sensor = SensorConfig::new(10, "temperature", 25.0)
            .with_variation_range(5.0)
            .with_change_rate(0.5)
            .with_interval(Duration::from_secs(1));
        if let Some(error) = error {
            sensor = sensor.with_error(error);
        }
        DeviceConfig::new(100, "boiler").with_sensor(sensor)
    }

    fn orchestrator(config: ContainerConfig, options: RuntimeOptions) -> ContainerOrchestrator {
        ContainerOrchestrator::new(
            config,
            TransportSettings::default(),
            RuntimeSettings::default(),
            Arc::new(options),
        )
        .with_seed(7)
    }

    struct HangingSink;

    impl TelemetrySink for HangingSink {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn publish(&mut self, _reading: &Reading) -> std::result::Result<Ack, ContractError> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), ContractError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_ticks_counted_and_published() {
        let sink = RecordingSink::new("recording");
        let mut orch = orchestrator(container(vec![temperature_device(None)]), RuntimeOptions::new());

        orch.start_with_sink(TransportKind::Mqtt, sink.clone()).await.unwrap();
        assert_eq!(orch.state(), ContainerState::Active);
        assert!(orch.is_active());
        assert!(orch.start_time().is_some());

        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(orch.message_count(), 3);
        let published = sink.published();
        assert_eq!(published.len(), 3);
        for reading in &published {
            let value = reading.value.unwrap();
            assert!((20.0..=30.0).contains(&value), "value {value} out of window");
        }

        let outcome = orch.stop().await;
        assert_eq!(outcome, StopOutcome::Stopped { message_count: 3 });
        assert_eq!(orch.state(), ContainerState::Inactive);
        assert!(!orch.is_active());
        assert!(orch.start_time().is_none());
        assert_eq!(orch.snapshot().message_count, 3);
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_start_without_devices_fails_without_state_change() {
        let store = Arc::new(MemoryStore::new());
        let mut orch = orchestrator(container(Vec::new()), RuntimeOptions::new())
            .with_store(store.clone());

        let err = orch.start(TransportKind::Log).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NoDevices { container_id: 1 }));
        assert!(err.is_configuration());
        assert!(!orch.is_active());
        assert_eq!(orch.state(), ContainerState::Inactive);
        assert!(store.history().is_empty());
    }

    #[tokio::test]
    async fn test_iothub_without_host_is_not_configured() {
        let mut orch = orchestrator(container(vec![temperature_device(None)]), RuntimeOptions::new());
        let err = orch.start(TransportKind::Iothub).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::TransportNotConfigured { .. }));
        assert_eq!(orch.state(), ContainerState::Inactive);
    }

    #[tokio::test]
    async fn test_mqtt_without_broker_fails_to_connect() {
        let mut orch = orchestrator(container(vec![temperature_device(None)]), RuntimeOptions::new());
        let err = orch.start(TransportKind::Mqtt).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::TransportConnect { .. }));
        assert!(!orch.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected() {
        let mut orch = orchestrator(container(vec![temperature_device(None)]), RuntimeOptions::new());
        orch.start(TransportKind::Log).await.unwrap();

        let err = orch.start(TransportKind::Log).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::AlreadyActive {
                state: ContainerState::Active,
                ..
            }
        ));
        orch.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_inactive_is_noop() {
        let mut orch = orchestrator(container(vec![temperature_device(None)]), RuntimeOptions::new());
        assert_eq!(orch.stop().await, StopOutcome::AlreadyInactive);
        assert_eq!(orch.state(), ContainerState::Inactive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_transition_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        let mut orch = orchestrator(container(vec![temperature_device(None)]), RuntimeOptions::new())
            .with_store(store.clone());

        orch.start(TransportKind::Log).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        orch.stop().await;

        assert_eq!(
            store.states(1),
            vec![
                ContainerState::Starting,
                ContainerState::Active,
                ContainerState::Stopping,
                ContainerState::Inactive,
            ]
        );
        let last = store.latest(1).unwrap();
        assert!(!last.is_active);
        assert!(last.start_time.is_none());
        assert_eq!(last.message_count, 2);
        assert_eq!(last.epoch, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_count_once_publish_twice() {
        let duplicate = ErrorDefinition::DuplicateData(ProbabilityParams { probability: 1.0 });
        let sink = RecordingSink::new("recording");
        let mut orch = orchestrator(
            container(vec![temperature_device(Some(duplicate))]),
            RuntimeOptions::new(),
        );

        orch.start_with_sink(TransportKind::Mqtt, sink.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        orch.stop().await;

        // Duplicate fires on tick 1 only; the next is held off by the gap.
        assert_eq!(orch.message_count(), 3);
        assert_eq!(sink.count(), 4);
        assert_eq!(orch.live_view().observed(), 4);
        assert_eq!(orch.reading_summary().total_duplicates, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_demo_mode_suppresses_sink_but_not_observer() {
        let sink = RecordingSink::new("recording");
        let mut orch = orchestrator(
            container(vec![temperature_device(None)]),
            RuntimeOptions::with_demo_mode(true),
        );

        orch.start_with_sink(TransportKind::Mqtt, sink.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;

        let (_, metrics) = orch.sink_metrics().unwrap();
        assert_eq!(metrics.suppressed, 3);
        orch.stop().await;

        assert_eq!(sink.count(), 0);
        assert_eq!(orch.message_count(), 3);
        assert_eq!(orch.live_view().observed(), 3);
        assert_eq!(orch.live_view().log_lines().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_sink_does_not_stop_counting() {
        let sink = RecordingSink::new("recording");
        sink.set_failing(true);
        let mut orch = orchestrator(container(vec![temperature_device(None)]), RuntimeOptions::new());

        orch.start_with_sink(TransportKind::Mqtt, sink.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;

        let (_, metrics) = orch.sink_metrics().unwrap();
        assert_eq!(metrics.failures, 3);
        assert_eq!(orch.state(), ContainerState::Active);
        orch.stop().await;

        assert_eq!(orch.message_count(), 3);
        assert_eq!(orch.live_view().observed(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_bounded_when_sink_hangs() {
        let mut orch = orchestrator(container(vec![temperature_device(None)]), RuntimeOptions::new());
        orch.start_with_sink(TransportKind::Mqtt, HangingSink).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let begun = Instant::now();
        let outcome = orch.stop().await;
        let elapsed = begun.elapsed();

        assert_eq!(outcome, StopOutcome::ForcedReclaim { message_count: 1 });
        assert!(elapsed <= Duration::from_millis(5100), "stop took {elapsed:?}");
        assert_eq!(orch.state(), ContainerState::Inactive);
        assert!(orch.start_time().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_epoch_readings_are_dropped() {
        let sink = RecordingSink::new("recording");
        let mut orch = orchestrator(container(vec![temperature_device(None)]), RuntimeOptions::new());

        orch.start_with_sink(TransportKind::Mqtt, sink.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        orch.stop().await;
        let stray = sink.published()[0].clone();

        assert!(orch.shared.accept(1, stray.clone()).is_none());
        assert_eq!(orch.message_count(), 1);

        orch.start_with_sink(TransportKind::Mqtt, RecordingSink::new("second")).await.unwrap();
        assert_eq!(orch.snapshot().epoch, 2);
        assert_eq!(orch.message_count(), 0);
        assert!(orch.shared.accept(1, stray.clone()).is_none());
        assert!(orch.shared.accept(2, stray).is_some());
        assert_eq!(orch.message_count(), 1);
        orch.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_anomaly_sensor_keeps_running() {
        let anomaly = ErrorDefinition::Anomaly(AnomalyParams {
            probability_pos_anomaly: 1.0,
            probability_neg_anomaly: 0.0,
            pos_anomaly_lower_range: 100.0,
            pos_anomaly_upper_range: 200.0,
            neg_anomaly_lower_range: 0.0,
            neg_anomaly_upper_range: 0.0,
        });
        let mut orch = orchestrator(
            container(vec![temperature_device(Some(anomaly))]),
            RuntimeOptions::new(),
        );
        orch.start(TransportKind::Log).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let latest = orch.live_view().latest(10).unwrap();
        assert!(latest.value.unwrap() >= 100.0);
        assert_eq!(orch.sensor_status().len(), 1);
        orch.stop().await;
    }

    /// Minimal broker: CONNACK every client, hang up on the first one after `drop_after`
    async fn flaky_broker(drop_after: Duration) -> u16 {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut first = true;
            while let Ok((mut socket, _)) = listener.accept().await {
                let hang_up = std::mem::take(&mut first);
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    if socket.read(&mut buf).await.unwrap_or(0) == 0 {
                        return;
                    }
                    if socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await.is_err() {
                        return;
                    }
                    if hang_up {
                        tokio::time::sleep(drop_after).await;
                        return;
                    }
                    while socket.read(&mut buf).await.unwrap_or(0) > 0 {}
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn test_lost_connection_moves_to_error_and_allows_restart() {
        let port = flaky_broker(Duration::from_millis(300)).await;
        let mut transport = TransportSettings::default();
        transport.mqtt.host = Some("127.0.0.1".to_string());
        transport.mqtt.port = port;
        transport.mqtt.connect_timeout_secs = 2;

        let mut config = container(Vec::new());
        config.devices.push(DeviceConfig::new(100, "boiler").with_sensor(
            SensorConfig::new(10, "temperature", 25.0).with_interval(Duration::from_millis(50)),
        ));
        let store = Arc::new(MemoryStore::new());
        let mut orch = ContainerOrchestrator::new(
            config,
            transport,
            RuntimeSettings::default(),
            Arc::new(RuntimeOptions::new()),
        )
        .with_store(store.clone());

        let mut rx = orch.subscribe();
        orch.start(TransportKind::Mqtt).await.unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| s.state == ContainerState::Error),
        )
        .await
        .expect("container never entered the error state")
        .unwrap();

        let snapshot = orch.snapshot();
        assert_eq!(snapshot.state, ContainerState::Error);
        assert!(!orch.is_active());
        assert!(orch.start_time().is_none());
        assert!(snapshot.start_time.is_none());
        assert!(snapshot.last_error.is_some());

        let history = store.states(1);
        assert!(history.contains(&ContainerState::Active));
        assert_eq!(history.last(), Some(&ContainerState::Error));
        let persisted = store.latest(1).unwrap();
        assert!(!persisted.is_active);
        assert!(persisted.start_time.is_none());

        let frozen = orch.message_count();
        assert!(frozen > 0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(orch.message_count(), frozen);

        assert_eq!(orch.stop().await, StopOutcome::AlreadyInactive);
        assert_eq!(orch.state(), ContainerState::Error);

        orch.start(TransportKind::Mqtt).await.unwrap();
        assert_eq!(orch.state(), ContainerState::Active);
        assert_eq!(orch.snapshot().epoch, 2);
        assert!(orch.snapshot().last_error.is_none());
        assert!(matches!(orch.stop().await, StopOutcome::Stopped { .. }));
        assert_eq!(orch.state(), ContainerState::Inactive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_transitions() {
        let mut orch = orchestrator(container(vec![temperature_device(None)]), RuntimeOptions::new());
        let rx = orch.subscribe();

        orch.start(TransportKind::Log).await.unwrap();
        assert_eq!(rx.borrow().state, ContainerState::Active);
        orch.stop().await;
        assert_eq!(rx.borrow().state, ContainerState::Inactive);
    }
}
