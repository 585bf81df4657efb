//! Telemetry error types

use thiserror::Error;

/// Telemetry-specific errors
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Required transport setting missing
    #[error("transport '{transport}' not configured: {message}")]
    NotConfigured { transport: String, message: String },

    /// Connect / handshake failure
    #[error("transport '{transport}' connect failed: {message}")]
    Connect { transport: String, message: String },

    /// Malformed IoT Hub connection string
    #[error("invalid connection string: {message}")]
    InvalidConnectionString { message: String },

    /// Export failure
    #[error("export failed: {message}")]
    Export { message: String },

    /// Contract error
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TelemetryError {
    pub fn not_configured(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotConfigured {
            transport: transport.into(),
            message: message.into(),
        }
    }

    pub fn connect(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            transport: transport.into(),
            message: message.into(),
        }
    }

    pub fn invalid_connection_string(message: impl Into<String>) -> Self {
        Self::InvalidConnectionString {
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, TelemetryError>;
