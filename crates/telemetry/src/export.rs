//! Bulk export to JSON or CSV
//!
//! JSON keeps the device → sensor → records nesting; CSV is flattened and
//! sorted by timestamp. Both expand duplicates into two records.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use contracts::{DeviceId, Reading, ReadingEnvelope, SensorId};
use serde::Serialize;
use tracing::info;

use crate::error::{Result, TelemetryError};

const CSV_HEADER: &str = "timestamp,sensorId,sensorName,value,unit,deviceId,deviceName";

/// Export file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => f.write_str("json"),
            ExportFormat::Csv => f.write_str("csv"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(TelemetryError::Export {
                message: format!("unsupported export format '{other}'"),
            }),
        }
    }
}

/// Nested export document
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSet {
    pub devices: Vec<DeviceExport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceExport {
    pub device_id: DeviceId,
    pub device_name: String,
    pub sensors: Vec<SensorExport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorExport {
    pub sensor_id: SensorId,
    pub sensor_name: String,
    pub unit: u16,
    pub records: Vec<ReadingEnvelope>,
}

impl ExportSet {
    /// Group readings by device then sensor, in first-seen order
    pub fn from_readings(readings: &[Reading]) -> Self {
        let mut set = ExportSet::default();
        for reading in readings {
            let device = match set
                .devices
                .iter()
                .position(|d| d.device_id == reading.device_id)
            {
                Some(idx) => &mut set.devices[idx],
                None => {
                    set.devices.push(DeviceExport {
                        device_id: reading.device_id,
                        device_name: reading.device_name.clone(),
                        sensors: Vec::new(),
                    });
                    let last = set.devices.len() - 1;
                    &mut set.devices[last]
                }
            };

            let sensor = match device
                .sensors
                .iter()
                .position(|s| s.sensor_id == reading.sensor_id)
            {
                Some(idx) => &mut device.sensors[idx],
                None => {
                    device.sensors.push(SensorExport {
                        sensor_id: reading.sensor_id,
                        sensor_name: reading.sensor_name.clone(),
                        unit: reading.unit,
                        records: Vec::new(),
                    });
                    let last = device.sensors.len() - 1;
                    &mut device.sensors[last]
                }
            };

            for _ in 0..reading.emissions() {
                sensor.records.push(reading.envelope());
            }
        }
        set
    }

    /// Total records across all sensors
    pub fn record_count(&self) -> usize {
        self.devices
            .iter()
            .flat_map(|d| &d.sensors)
            .map(|s| s.records.len())
            .sum()
    }
}

/// Write the nested document as pretty JSON; returns the record count
pub fn write_json<W: Write>(readings: &[Reading], writer: W) -> Result<usize> {
    let set = ExportSet::from_readings(readings);
    serde_json::to_writer_pretty(writer, &set)?;
    Ok(set.record_count())
}

/// Write flattened, timestamp-sorted CSV; returns the row count
pub fn write_csv<W: Write>(readings: &[Reading], mut writer: W) -> Result<usize> {
    let mut rows: Vec<&Reading> = readings
        .iter()
        .flat_map(|r| std::iter::repeat(r).take(r.emissions()))
        .collect();
    rows.sort_by_key(|r| r.timestamp);

    writeln!(writer, "{CSV_HEADER}")?;
    for reading in &rows {
        let envelope = reading.envelope();
        writeln!(
            writer,
            "{},{},{},{},{},{},{}",
            envelope.timestamp,
            envelope.sensor_id,
            csv_field(&envelope.sensor_name),
            envelope.value.map(|v| v.to_string()).unwrap_or_default(),
            envelope.unit,
            envelope.device_id,
            csv_field(&envelope.device_name),
        )?;
    }
    writer.flush()?;
    Ok(rows.len())
}

/// Export to a file; returns the number of records written
pub fn export_to_path(readings: &[Reading], format: ExportFormat, path: &Path) -> Result<usize> {
    let writer = BufWriter::new(File::create(path)?);
    let written = match format {
        ExportFormat::Json => write_json(readings, writer)?,
        ExportFormat::Csv => write_csv(readings, writer)?,
    };
    info!(path = %path.display(), format = %format, records = written, "export written");
    Ok(written)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
