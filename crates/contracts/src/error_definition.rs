//! Error injection definitions
//!
//! Configuration shape of the per-sensor data-quality defects. The simulator
//! turns these into stateful policies; this module only carries parameters.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::ContractError;

/// Drifting sensors shift their base value every this many ticks
pub const DRIFT_EVERY_N_TICKS: u64 = 10;

/// Per-sensor error injection, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorDefinition {
    /// No defects
    NoError,
    /// Random positive / negative spikes
    Anomaly(AnomalyParams),
    /// Missing completely at random
    Mcar(ProbabilityParams),
    /// Emit the same reading twice
    DuplicateData(ProbabilityParams),
    /// Permanently move the base value after onset
    Drift(DriftParams),
}

/// Anomaly parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AnomalyParams {
    #[validate(range(min = 0.0, max = 1.0))]
    pub probability_pos_anomaly: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub probability_neg_anomaly: f64,
    #[validate(range(min = 0.0))]
    pub pos_anomaly_lower_range: f64,
    #[validate(range(min = 0.0))]
    pub pos_anomaly_upper_range: f64,
    #[validate(range(min = 0.0))]
    pub neg_anomaly_lower_range: f64,
    #[validate(range(min = 0.0))]
    pub neg_anomaly_upper_range: f64,
}

/// Single-probability parameters (MCAR, duplicates)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProbabilityParams {
    #[validate(range(min = 0.0, max = 1.0))]
    pub probability: f64,
}

/// Drift parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct DriftParams {
    /// Ticks before drifting starts
    pub after_n_iterations: u64,
    /// Mean shift applied per drift step
    pub average_drift_rate: f64,
    /// Half-width of the random component of each shift
    #[validate(range(min = 0.0))]
    pub variation_range: f64,
}

impl ErrorDefinition {
    /// Wire tag of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            ErrorDefinition::NoError => "no_error",
            ErrorDefinition::Anomaly(_) => "anomaly",
            ErrorDefinition::Mcar(_) => "mcar",
            ErrorDefinition::DuplicateData(_) => "duplicate_data",
            ErrorDefinition::Drift(_) => "drift",
        }
    }

    /// Validate parameter ranges
    pub fn check(&self) -> Result<(), ContractError> {
        let result = match self {
            ErrorDefinition::NoError => Ok(()),
            ErrorDefinition::Anomaly(p) => {
                if p.pos_anomaly_lower_range > p.pos_anomaly_upper_range {
                    return Err(ContractError::config_validation(
                        "pos_anomaly_lower_range",
                        "must not exceed pos_anomaly_upper_range",
                    ));
                }
                if p.neg_anomaly_lower_range > p.neg_anomaly_upper_range {
                    return Err(ContractError::config_validation(
                        "neg_anomaly_lower_range",
                        "must not exceed neg_anomaly_upper_range",
                    ));
                }
                p.validate()
            }
            ErrorDefinition::Mcar(p) | ErrorDefinition::DuplicateData(p) => p.validate(),
            ErrorDefinition::Drift(p) => {
                if !p.average_drift_rate.is_finite() {
                    return Err(ContractError::config_validation(
                        "average_drift_rate",
                        "must be finite",
                    ));
                }
                p.validate()
            }
        };

        result.map_err(|e| ContractError::config_validation(self.kind(), e.to_string()))
    }
}
