//! Orchestrator error types

use contracts::{ContainerId, ContainerState, TransportKind};
use telemetry::TelemetryError;
use thiserror::Error;

/// Failures surfaced synchronously by `start()`
///
/// None of these mutate container state.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Container has nothing to run
    #[error("container {container_id} has no devices")]
    NoDevices { container_id: ContainerId },

    /// Transport selected but its settings are missing
    #[error("transport '{transport}' not configured for container {container_id}: {message}")]
    TransportNotConfigured {
        container_id: ContainerId,
        transport: TransportKind,
        message: String,
    },

    /// Connect or handshake failure
    #[error("transport '{transport}' connect failed for container {container_id}: {source}")]
    TransportConnect {
        container_id: ContainerId,
        transport: TransportKind,
        #[source]
        source: TelemetryError,
    },

    /// Start requested while a run is in progress
    #[error("container {container_id} is already {state}")]
    AlreadyActive {
        container_id: ContainerId,
        state: ContainerState,
    },

    /// No container with this id is registered
    #[error("unknown container {0}")]
    UnknownContainer(ContainerId),
}

impl OrchestratorError {
    /// Map a sink construction error onto the start() taxonomy
    pub(crate) fn from_transport(
        container_id: ContainerId,
        transport: TransportKind,
        error: TelemetryError,
    ) -> Self {
        match (transport, error) {
            (TransportKind::Iothub, TelemetryError::NotConfigured { message, .. }) => {
                Self::TransportNotConfigured {
                    container_id,
                    transport,
                    message,
                }
            }
            (transport, source) => Self::TransportConnect {
                container_id,
                transport,
                source,
            },
        }
    }

    /// Configuration problems as opposed to connectivity problems
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoDevices { .. } | Self::TransportNotConfigured { .. }
        )
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, OrchestratorError>;
