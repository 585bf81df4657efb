//! Per-sensor periodic runner
//!
//! Implements `SensorSource`: one cancellable tokio task per sensor that
//! ticks every `interval` and hands each sample to the delivery callback.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use contracts::{SampleCallback, SensorConfig, SensorId, SensorSample, SensorSource};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::generator::{Generated, ValueGenerator};
use crate::{Result, SimulatorError};

/// Runner state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Running,
    BulkGenerating,
}

/// Observable runtime fields of a sensor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorStatus {
    pub sensor_id: SensorId,
    /// Center of the window, moves only under drift
    pub base_value: f64,
    /// Walk state, always inside the window except right after a drift shift
    pub current_value: Option<f64>,
    /// Last value handed downstream, `None` for a missing sample
    pub last_value: Option<f64>,
    pub ticks: u64,
    pub running: bool,
}

/// Periodic sensor runner
pub struct SensorRunner {
    config: SensorConfig,
    seed: Option<u64>,
    running: Arc<AtomicBool>,
    state: Mutex<RunnerState>,
    parent: CancellationToken,
    token: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
    status: Arc<Mutex<SensorStatus>>,
}

impl SensorRunner {
    /// Create runner whose ticks are cancelled together with `parent`
    pub fn new(config: SensorConfig, parent: CancellationToken) -> Self {
        let status = SensorStatus {
            sensor_id: config.id,
            base_value: config.base_value,
            ..Default::default()
        };
        Self {
            config,
            seed: None,
            running: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(RunnerState::Idle),
            parent,
            token: Mutex::new(None),
            task: Mutex::new(None),
            status: Arc::new(Mutex::new(status)),
        }
    }

    /// Use a fixed RNG seed for every generator this runner creates
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub fn state(&self) -> RunnerState {
        *self.state.lock()
    }

    pub fn status(&self) -> SensorStatus {
        self.status.lock().clone()
    }

    fn generator(&self) -> ValueGenerator {
        match self.seed {
            Some(seed) => ValueGenerator::seeded(&self.config, seed),
            None => ValueGenerator::new(&self.config),
        }
    }

    /// Start periodic generation
    ///
    /// # Errors
    /// - `Busy` if already running or bulk generating
    /// - `NoRuntime` outside a tokio runtime
    pub fn start(&self, callback: SampleCallback) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SimulatorError::NoRuntime {
                sensor_id: self.config.id,
            }
        })?;

        let mut state = self.state.lock();
        if *state != RunnerState::Idle {
            return Err(SimulatorError::Busy {
                sensor_id: self.config.id,
                state: *state,
            });
        }

        // A previous run may still be unwinding its last tick.
        if let Some(stale) = self.task.lock().take() {
            stale.abort();
        }

        let token = self.parent.child_token();
        self.running.store(true, Ordering::Release);
        {
            let mut status = self.status.lock();
            *status = SensorStatus {
                sensor_id: self.config.id,
                base_value: self.config.base_value,
                running: true,
                ..Default::default()
            };
        }

        let tick = TickLoop {
            config: self.config.clone(),
            generator: self.generator(),
            running: self.running.clone(),
            status: self.status.clone(),
            callback,
        };
        let handle = runtime.spawn(tick.run(token.clone()));

        *self.token.lock() = Some(token);
        *self.task.lock() = Some(handle);
        *state = RunnerState::Running;

        debug!(
            sensor_id = self.config.id,
            interval_ms = self.config.interval().as_millis() as u64,
            "sensor runner started"
        );
        Ok(())
    }

    /// Request stop; returns immediately
    pub fn request_stop(&self) {
        let mut state = self.state.lock();
        if *state != RunnerState::Running {
            return;
        }
        self.running.store(false, Ordering::Release);
        if let Some(token) = self.token.lock().take() {
            token.cancel();
        }
        self.status.lock().running = false;
        *state = RunnerState::Idle;
        debug!(sensor_id = self.config.id, "sensor runner stop requested");
    }

    /// Wait for the tick task of the last run to finish
    pub async fn join(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(sensor_id = self.config.id, error = %e, "sensor task ended abnormally");
                }
            }
        }
    }

    /// Generate `n` samples synchronously with a fresh generator
    ///
    /// Timestamps are `start + i * interval`. Live state is untouched.
    ///
    /// # Errors
    /// `Busy` while the runner is ticking.
    pub fn bulk(&self, n: usize, start: DateTime<Utc>) -> Result<Vec<SensorSample>> {
        {
            let mut state = self.state.lock();
            if *state != RunnerState::Idle {
                return Err(SimulatorError::Busy {
                    sensor_id: self.config.id,
                    state: *state,
                });
            }
            *state = RunnerState::BulkGenerating;
        }

        let result = self
            .generator()
            .bulk(n, start, self.config.interval())
            .map(|values| {
                values
                    .into_iter()
                    .map(|(timestamp, generated)| sample(&self.config, timestamp, generated))
                    .collect::<Vec<_>>()
            });

        *self.state.lock() = RunnerState::Idle;
        result
    }
}

impl SensorSource for SensorRunner {
    fn sensor_id(&self) -> SensorId {
        self.config.id
    }

    fn listen(&self, callback: SampleCallback) -> bool {
        match self.start(callback) {
            Ok(()) => true,
            Err(e @ SimulatorError::Busy { .. }) => {
                debug!(sensor_id = self.config.id, error = %e, "sensor busy, listen ignored");
                false
            }
            Err(e) => {
                error!(sensor_id = self.config.id, error = %e, "failed to start sensor");
                false
            }
        }
    }

    fn stop(&self) {
        self.request_stop();
    }

    fn is_listening(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for SensorRunner {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(token) = self.token.get_mut().take() {
            token.cancel();
        }
    }
}

pub(crate) fn sample(
    config: &SensorConfig,
    timestamp: DateTime<Utc>,
    generated: Generated,
) -> SensorSample {
    SensorSample {
        sensor_id: config.id,
        sensor_name: config.name.clone(),
        unit: config.unit,
        timestamp,
        value: generated.value,
        duplicate: generated.duplicate,
        sequence: generated.iteration,
    }
}

struct TickLoop {
    config: SensorConfig,
    generator: ValueGenerator,
    running: Arc<AtomicBool>,
    status: Arc<Mutex<SensorStatus>>,
    callback: SampleCallback,
}

impl TickLoop {
    async fn run(mut self, token: CancellationToken) {
        let period = self.config.interval();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            self.tick();
        }

        trace!(sensor_id = self.config.id, "sensor tick loop exited");
    }

    fn tick(&mut self) {
        let sensor_id = self.config.id;
        let generated = match catch_unwind(AssertUnwindSafe(|| self.generator.next())) {
            Ok(Ok(generated)) => generated,
            Ok(Err(e)) => {
                warn!(sensor_id, error = %e, "tick skipped");
                return;
            }
            Err(_) => {
                error!(sensor_id, "generator panicked, tick skipped");
                return;
            }
        };

        {
            let mut status = self.status.lock();
            status.base_value = self.generator.base_value();
            status.current_value = self.generator.current_value();
            status.last_value = generated.value;
            status.ticks = generated.iteration;
        }

        // Stop may have been requested while generating.
        if !self.running.load(Ordering::Acquire) {
            return;
        }

        let sample = sample(&self.config, Utc::now(), generated);
        let callback = &self.callback;
        if catch_unwind(AssertUnwindSafe(|| callback(sample))).is_err() {
            error!(sensor_id, "delivery callback panicked, sample dropped");
        }
    }
}
