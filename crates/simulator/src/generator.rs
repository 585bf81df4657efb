//! Bounded random-walk value generator

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use contracts::{SensorConfig, SensorId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error_policy::ErrorPolicy;
use crate::{Result, SimulatorError};

/// One generated value after the error policy ran
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Generated {
    pub value: Option<f64>,
    pub duplicate: bool,
    /// 1-based tick number
    pub iteration: u64,
}

/// Per-sensor value engine
///
/// Each call to [`next`](Self::next) moves the previous value by a uniform
/// step of at most `variation_range * change_rate`, clamps it to
/// `base_value ± variation_range` and hands the rounded result to the error
/// policy. The unrounded value is kept as the walk state.
pub struct ValueGenerator<R = StdRng> {
    sensor_id: SensorId,
    base_value: f64,
    variation_range: f64,
    change_rate: f64,
    previous: Option<f64>,
    iteration: u64,
    policy: ErrorPolicy,
    rng: R,
}

impl ValueGenerator<StdRng> {
    /// Generator seeded from the OS
    pub fn new(config: &SensorConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Reproducible generator
    pub fn seeded(config: &SensorConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> ValueGenerator<R> {
    pub fn with_rng(config: &SensorConfig, rng: R) -> Self {
        Self {
            sensor_id: config.id,
            base_value: config.base_value,
            variation_range: config.variation_range,
            change_rate: config.change_rate,
            previous: None,
            iteration: 0,
            policy: ErrorPolicy::from_definition(config.error_definition.as_ref()),
            rng,
        }
    }

    /// Produce the next value
    ///
    /// # Errors
    /// `Generation` when the walk parameters cannot produce a finite value.
    pub fn next(&mut self) -> Result<Generated> {
        self.iteration += 1;

        let (low, high) = self.bounds();
        if !(low.is_finite() && high.is_finite() && low <= high) {
            return Err(SimulatorError::generation(
                self.sensor_id,
                format!("invalid window [{low}, {high}]"),
            ));
        }
        let max_change = self.variation_range * self.change_rate;
        if !max_change.is_finite() {
            return Err(SimulatorError::generation(
                self.sensor_id,
                format!("invalid change rate {}", self.change_rate),
            ));
        }

        let max_change = max_change.abs();
        let delta = if max_change > 0.0 {
            self.rng.random_range(-max_change..=max_change)
        } else {
            0.0
        };
        let previous = self.previous.unwrap_or(self.base_value);
        let walked = (previous + delta).clamp(low, high);
        self.previous = Some(walked);

        let emitted = round2(walked).clamp(low, high);
        let outcome = self.policy.apply(emitted, self.iteration, &mut self.rng);
        if let Some(shift) = outcome.base_shift {
            self.base_value += shift;
        }

        Ok(Generated {
            value: outcome.value.map(round2),
            duplicate: outcome.duplicate,
            iteration: self.iteration,
        })
    }

    /// Generate `n` values timestamped `start + i * interval`
    pub fn bulk(
        &mut self,
        n: usize,
        start: DateTime<Utc>,
        interval: Duration,
    ) -> Result<Vec<(DateTime<Utc>, Generated)>> {
        let step = TimeDelta::from_std(interval).map_err(|e| {
            SimulatorError::generation(self.sensor_id, format!("interval out of range: {e}"))
        })?;

        let mut out = Vec::with_capacity(n);
        let mut timestamp = start;
        for _ in 0..n {
            out.push((timestamp, self.next()?));
            timestamp += step;
        }
        Ok(out)
    }

    /// Current window `(low, high)`
    pub fn bounds(&self) -> (f64, f64) {
        (
            self.base_value - self.variation_range,
            self.base_value + self.variation_range,
        )
    }

    pub fn base_value(&self) -> f64 {
        self.base_value
    }

    /// Walk state, `None` before the first tick
    pub fn current_value(&self) -> Option<f64> {
        self.previous
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn policy(&self) -> &ErrorPolicy {
        &self.policy
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
