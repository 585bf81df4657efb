//! SimulationBlueprint - Config Loader output
//!
//! Describes every container to simulate plus transport and runtime options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ContainerConfig, ContainerId, TransportSettings};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    #[serde(rename = "1")]
    V1,
}

/// Complete simulation configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Containers to simulate
    #[serde(default)]
    pub containers: Vec<ContainerConfig>,

    /// Transport settings
    #[serde(default)]
    pub transport: TransportSettings,

    /// Process-wide options
    #[serde(default)]
    pub options: OptionsConfig,

    /// Orchestrator tuning
    #[serde(default)]
    pub runtime: RuntimeSettings,
}

impl SimulationBlueprint {
    /// Find a container by id
    pub fn container(&self, id: ContainerId) -> Option<&ContainerConfig> {
        self.containers.iter().find(|c| c.id == id)
    }
}

/// Persisted option defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionsConfig {
    /// Suppress outbound publishing
    #[serde(default)]
    pub demo_mode: bool,
}

/// Longest accepted bounded-stop wait
pub const MAX_SHUTDOWN_TIMEOUT_SECS: f64 = 300.0;

fn default_shutdown_timeout_secs() -> f64 {
    5.0
}

fn default_sink_queue_capacity() -> usize {
    256
}

fn default_live_view_capacity() -> usize {
    500
}

/// Orchestrator tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Upper bound on `stop()` waiting for the background task
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: f64,

    /// Per-container sink queue capacity
    #[serde(default = "default_sink_queue_capacity")]
    pub sink_queue_capacity: usize,

    /// Points kept per sensor in the live view
    #[serde(default = "default_live_view_capacity")]
    pub live_view_capacity: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            sink_queue_capacity: default_sink_queue_capacity(),
            live_view_capacity: default_live_view_capacity(),
        }
    }
}

impl RuntimeSettings {
    /// Bounded-stop wait, clamped to `[0, MAX_SHUTDOWN_TIMEOUT_SECS]`
    pub fn shutdown_timeout(&self) -> Duration {
        let max = Duration::from_secs_f64(MAX_SHUTDOWN_TIMEOUT_SECS);
        if self.shutdown_timeout_secs.is_nan() || self.shutdown_timeout_secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.shutdown_timeout_secs)
            .map_or(max, |d| d.min(max))
    }
}
