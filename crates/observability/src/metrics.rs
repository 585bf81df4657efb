//! Simulation metrics
//!
//! `metrics` facade counters for readings, publishes and lifecycle events, plus
//! an in-memory aggregator for end-of-run summaries.

use std::collections::BTreeMap;

use contracts::{ContainerId, Reading, SensorId};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Register help text for every simulator metric with the installed recorder
pub fn describe_metrics() {
    describe_counter!("iot_sim_readings_total", "Logical readings accepted per container");
    describe_counter!(
        "iot_sim_readings_missing_total",
        "Readings whose value was dropped by an error policy"
    );
    describe_counter!(
        "iot_sim_readings_duplicate_total",
        "Readings flagged to be published twice"
    );
    describe_gauge!("iot_sim_sensor_value", "Last emitted value per sensor");
    describe_counter!(
        "iot_sim_publish_total",
        "Physical publish attempts by sink and outcome"
    );
    describe_histogram!(
        "iot_sim_publish_latency_ms",
        Unit::Milliseconds,
        "Time spent in a single sink publish"
    );
    describe_gauge!("iot_sim_active_containers", "Containers currently running");
    describe_counter!(
        "iot_sim_shutdown_forced_total",
        "Stops that aborted a background task after the timeout"
    );
    describe_counter!(
        "iot_sim_container_failures_total",
        "Runs that ended in the error state"
    );
}

/// Record one logical reading accepted by a container
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_reading;
///
/// let on_reading = move |reading: Reading| {
///     record_reading(&reading);
///     // ...
/// };
/// ```
pub fn record_reading(reading: &Reading) {
    let container = reading.container_id.to_string();
    counter!("iot_sim_readings_total", "container" => container.clone()).increment(1);

    match reading.value {
        Some(value) => {
            gauge!(
                "iot_sim_sensor_value",
                "sensor_id" => reading.sensor_id.to_string()
            )
            .set(value);
        }
        None => {
            counter!("iot_sim_readings_missing_total", "container" => container.clone())
                .increment(1);
        }
    }

    if reading.duplicate {
        counter!("iot_sim_readings_duplicate_total", "container" => container).increment(1);
    }
}

/// Record the outcome of one physical publish
pub fn record_publish(sink_name: &str, status: &'static str) {
    counter!(
        "iot_sim_publish_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record publish latency
pub fn record_publish_latency_ms(sink_name: &str, latency_ms: f64) {
    histogram!("iot_sim_publish_latency_ms", "sink" => sink_name.to_string()).record(latency_ms);
}

/// Record a container entering or leaving the active set
pub fn record_container_active(active: bool) {
    if active {
        gauge!("iot_sim_active_containers").increment(1.0);
    } else {
        gauge!("iot_sim_active_containers").decrement(1.0);
    }
}

/// Record a stop that gave up waiting on the background task
pub fn record_forced_shutdown(container_id: ContainerId) {
    counter!(
        "iot_sim_shutdown_forced_total",
        "container" => container_id.to_string()
    )
    .increment(1);
}

/// Record a run ending in the error state
pub fn record_container_failure(container_id: ContainerId) {
    counter!(
        "iot_sim_container_failures_total",
        "container" => container_id.to_string()
    )
    .increment(1);
}

/// Reading metrics aggregator
///
/// Aggregates in memory for summaries at the end of a run.
#[derive(Debug, Clone, Default)]
pub struct ReadingStatsAggregator {
    /// Logical readings
    pub total_readings: u64,

    /// Readings with a missing value
    pub total_missing: u64,

    /// Readings flagged duplicate
    pub total_duplicates: u64,

    /// Per-sensor value statistics
    pub value_stats: BTreeMap<SensorId, RunningStats>,

    /// Per-sensor missing counts
    pub missing_counts: BTreeMap<SensorId, u64>,
}

impl ReadingStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, reading: &Reading) {
        self.total_readings += 1;
        if reading.duplicate {
            self.total_duplicates += 1;
        }

        match reading.value {
            Some(value) => self
                .value_stats
                .entry(reading.sensor_id)
                .or_default()
                .push(value),
            None => {
                self.total_missing += 1;
                *self.missing_counts.entry(reading.sensor_id).or_insert(0) += 1;
            }
        }
    }

    pub fn summary(&self) -> ReadingSummary {
        let rate = |n: u64| {
            if self.total_readings > 0 {
                n as f64 / self.total_readings as f64 * 100.0
            } else {
                0.0
            }
        };
        ReadingSummary {
            total_readings: self.total_readings,
            total_missing: self.total_missing,
            total_duplicates: self.total_duplicates,
            missing_rate: rate(self.total_missing),
            duplicate_rate: rate(self.total_duplicates),
            sensor_values: self
                .value_stats
                .iter()
                .map(|(id, stats)| (*id, StatsSummary::from(stats)))
                .collect(),
            sensor_missing_counts: self.missing_counts.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Reading summary
#[derive(Debug, Clone, Default)]
pub struct ReadingSummary {
    pub total_readings: u64,
    pub total_missing: u64,
    pub total_duplicates: u64,
    pub missing_rate: f64,
    pub duplicate_rate: f64,
    pub sensor_values: BTreeMap<SensorId, StatsSummary>,
    pub sensor_missing_counts: BTreeMap<SensorId, u64>,
}

impl std::fmt::Display for ReadingSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Reading Summary ===")?;
        writeln!(f, "Total readings: {}", self.total_readings)?;
        writeln!(
            f,
            "Missing values: {} ({:.2}%)",
            self.total_missing, self.missing_rate
        )?;
        writeln!(
            f,
            "Duplicates: {} ({:.2}%)",
            self.total_duplicates, self.duplicate_rate
        )?;

        if !self.sensor_values.is_empty() {
            writeln!(f, "Sensor values:")?;
            for (sensor, stats) in &self.sensor_values {
                writeln!(f, "  {sensor}: {stats}")?;
            }
        }
        if !self.sensor_missing_counts.is_empty() {
            writeln!(f, "Missing per sensor:")?;
            for (sensor, count) in &self.sensor_missing_counts {
                writeln!(f, "  {sensor}: {count}")?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.2}, max={:.2}, mean={:.2}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn reading(sensor_id: SensorId, value: Option<f64>, duplicate: bool) -> Reading {
        Reading {
            container_id: 1,
            device_id: 1,
            device_name: "dev".to_string(),
            sensor_id,
            sensor_name: "s".to_string(),
            timestamp: Utc::now(),
            value,
            unit: 0,
            duplicate,
            sequence: 1,
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = ReadingStatsAggregator::new();
        aggregator.update(&reading(1, Some(20.0), false));
        aggregator.update(&reading(1, Some(22.0), true));
        aggregator.update(&reading(2, None, false));

        assert_eq!(aggregator.total_readings, 3);
        assert_eq!(aggregator.total_duplicates, 1);
        assert_eq!(aggregator.total_missing, 1);
        assert_eq!(aggregator.missing_counts.get(&2), Some(&1));
        assert!((aggregator.value_stats[&1].mean() - 21.0).abs() < 1e-10);

        aggregator.reset();
        assert_eq!(aggregator.total_readings, 0);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = ReadingStatsAggregator::new();
        for _ in 0..3 {
            aggregator.update(&reading(4, Some(10.0), false));
        }
        aggregator.update(&reading(4, None, false));

        let output = aggregator.summary().to_string();
        assert!(output.contains("Total readings: 4"));
        assert!(output.contains("Missing values: 1 (25.00%)"));
        assert!(output.contains("4: min=10.00"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_reading(&reading(1, None, true));
        record_publish("log", "delivered");
        record_container_active(true);
        record_container_active(false);
    }
}
