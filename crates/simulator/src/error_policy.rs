//! Error injection policies
//!
//! Stateful counterparts of [`ErrorDefinition`]. A policy sees every generated
//! value together with the generator's tick counter and decides whether to
//! distort it, drop it, duplicate it or move the generator's center.

use contracts::{AnomalyParams, DriftParams, ErrorDefinition, DRIFT_EVERY_N_TICKS};
use rand::Rng;

/// Minimum ticks between two duplicate emissions
const DUPLICATE_MIN_GAP: u64 = 3;

/// Result of applying a policy to one value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyOutcome {
    /// `None` is a deliberately missing sample
    pub value: Option<f64>,
    pub duplicate: bool,
    /// Permanent shift to apply to the generator's base value
    pub base_shift: Option<f64>,
}

impl PolicyOutcome {
    fn passthrough(value: f64) -> Self {
        Self {
            value: Some(value),
            duplicate: false,
            base_shift: None,
        }
    }
}

/// Error injection policy with its runtime state
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorPolicy {
    None,
    Anomaly(AnomalyParams),
    MissingAtRandom {
        probability: f64,
    },
    DuplicateEmission {
        probability: f64,
        last_duplicate: Option<u64>,
    },
    Drift {
        params: DriftParams,
        drifting: bool,
    },
}

impl ErrorPolicy {
    pub fn from_definition(definition: Option<&ErrorDefinition>) -> Self {
        match definition {
            None | Some(ErrorDefinition::NoError) => ErrorPolicy::None,
            Some(ErrorDefinition::Anomaly(p)) => ErrorPolicy::Anomaly(p.clone()),
            Some(ErrorDefinition::Mcar(p)) => ErrorPolicy::MissingAtRandom {
                probability: p.probability,
            },
            Some(ErrorDefinition::DuplicateData(p)) => ErrorPolicy::DuplicateEmission {
                probability: p.probability,
                last_duplicate: None,
            },
            Some(ErrorDefinition::Drift(p)) => ErrorPolicy::Drift {
                params: *p,
                drifting: false,
            },
        }
    }

    /// Short name for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ErrorPolicy::None => "none",
            ErrorPolicy::Anomaly(_) => "anomaly",
            ErrorPolicy::MissingAtRandom { .. } => "mcar",
            ErrorPolicy::DuplicateEmission { .. } => "duplicate_data",
            ErrorPolicy::Drift { .. } => "drift",
        }
    }

    /// Whether a drift policy has passed its onset
    pub fn is_drifting(&self) -> bool {
        matches!(self, ErrorPolicy::Drift { drifting: true, .. })
    }

    /// Apply the policy to a freshly generated value
    ///
    /// `iteration` is the 1-based tick number of the owning generator.
    pub fn apply<R: Rng>(
        &mut self,
        value: f64,
        iteration: u64,
        rng: &mut R,
    ) -> PolicyOutcome {
        match self {
            ErrorPolicy::None => PolicyOutcome::passthrough(value),

            ErrorPolicy::Anomaly(p) => {
                let mut value = value;
                // Both checks are independent and may stack in one tick.
                if chance(rng, p.probability_pos_anomaly) {
                    value += uniform(rng, p.pos_anomaly_lower_range, p.pos_anomaly_upper_range);
                }
                if chance(rng, p.probability_neg_anomaly) {
                    value -= uniform(rng, p.neg_anomaly_lower_range, p.neg_anomaly_upper_range);
                }
                PolicyOutcome::passthrough(value)
            }

            ErrorPolicy::MissingAtRandom { probability } => {
                if chance(rng, *probability) {
                    PolicyOutcome {
                        value: None,
                        duplicate: false,
                        base_shift: None,
                    }
                } else {
                    PolicyOutcome::passthrough(value)
                }
            }

            ErrorPolicy::DuplicateEmission {
                probability,
                last_duplicate,
            } => {
                let gap_ok = last_duplicate
                    .map_or(true, |last| iteration.saturating_sub(last) >= DUPLICATE_MIN_GAP);
                let duplicate = gap_ok && chance(rng, *probability);
                if duplicate {
                    *last_duplicate = Some(iteration);
                }
                PolicyOutcome {
                    value: Some(value),
                    duplicate,
                    base_shift: None,
                }
            }

            ErrorPolicy::Drift { params, drifting } => {
                if !*drifting && iteration > params.after_n_iterations {
                    *drifting = true;
                }
                let base_shift = (*drifting && iteration % DRIFT_EVERY_N_TICKS == 0).then(|| {
                    params.average_drift_rate
                        + uniform(rng, -params.variation_range, params.variation_range)
                });
                PolicyOutcome {
                    value: Some(value),
                    duplicate: false,
                    base_shift,
                }
            }
        }
    }
}

/// Bernoulli draw; `p <= 0` never fires, `p >= 1` always fires
fn chance<R: Rng>(rng: &mut R, p: f64) -> bool {
    rng.random::<f64>() < p
}

/// Uniform draw from `[low, high]`, degenerate ranges yield `low`
fn uniform<R: Rng>(rng: &mut R, low: f64, high: f64) -> f64 {
    if high > low && (high - low).is_finite() {
        rng.random_range(low..=high)
    } else {
        low
    }
}
