//! Local observer: rolling per-sensor series plus a rendered log
//!
//! Receives every reading of a container regardless of demo mode. Duplicate
//! readings are recorded twice, matching what the transport sees.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use contracts::{unit_symbol, Reading, SensorId};
use parking_lot::Mutex;

/// Consumer of every reading a container emits
pub trait ReadingObserver: Send + Sync {
    fn observe(&self, reading: &Reading);
}

/// One point of a sensor series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivePoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

#[derive(Default)]
struct LiveState {
    series: HashMap<SensorId, VecDeque<LivePoint>>,
    log: VecDeque<String>,
    observed: u64,
}

/// Bounded live view of a running container
pub struct LiveView {
    capacity: usize,
    state: Mutex<LiveState>,
}

impl LiveView {
    /// Keep at most `capacity` points per sensor and `capacity` log lines
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(LiveState::default()),
        }
    }

    /// Points of one sensor, oldest first
    pub fn series(&self, sensor_id: SensorId) -> Vec<LivePoint> {
        self.state
            .lock()
            .series
            .get(&sensor_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, sensor_id: SensorId) -> Option<LivePoint> {
        self.state
            .lock()
            .series
            .get(&sensor_id)
            .and_then(|s| s.back().copied())
    }

    /// Rendered log lines, oldest first
    pub fn log_lines(&self) -> Vec<String> {
        self.state.lock().log.iter().cloned().collect()
    }

    /// Physical emissions observed since the last clear
    pub fn observed(&self) -> u64 {
        self.state.lock().observed
    }

    pub fn clear(&self) {
        *self.state.lock() = LiveState::default();
    }
}

impl ReadingObserver for LiveView {
    fn observe(&self, reading: &Reading) {
        let point = LivePoint {
            timestamp: reading.timestamp,
            value: reading.value,
        };
        let line = render_line(reading);

        let mut state = self.state.lock();
        for _ in 0..reading.emissions() {
            let series = state.series.entry(reading.sensor_id).or_default();
            if series.len() == self.capacity {
                series.pop_front();
            }
            series.push_back(point);

            if state.log.len() == self.capacity {
                state.log.pop_front();
            }
            state.log.push_back(line.clone());
            state.observed += 1;
        }
    }
}

/// `HH:MM:SS: device - sensor - value symbol`
pub fn render_line(reading: &Reading) -> String {
    let value = match reading.value {
        Some(v) => format!("{v}"),
        None => "missing".to_string(),
    };
    let line = format!(
        "{}: {} - {} - {} {}",
        reading.timestamp.format("%H:%M:%S"),
        reading.device_name,
        reading.sensor_name,
        value,
        unit_symbol(reading.unit)
    );
    line.trim_end().to_string()
}
