//! # Integration Tests
//!
//! Cross-crate and end-to-end tests.
//!
//! Covers:
//! - Reading wire shape
//! - Config file → simulation → sink, no broker needed
//! - Bulk generation → export files
//! - The sample `sim.toml` at the workspace root

#[cfg(test)]
mod contract_tests {
    use chrono::{TimeZone, Utc};
    use contracts::Reading;

    fn reading(value: Option<f64>, duplicate: bool) -> Reading {
        Reading {
            container_id: 1,
            device_id: 2,
            device_name: "pump".to_string(),
            sensor_id: 3,
            sensor_name: "pressure".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            value,
            unit: 7,
            duplicate,
            sequence: 9,
        }
    }

    #[test]
    fn test_envelope_wire_shape() {
        let json = serde_json::to_value(reading(Some(1.25), true).envelope()).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "deviceId",
                "deviceName",
                "duplicate",
                "sensorId",
                "sensorName",
                "timestamp",
                "unit",
                "value"
            ]
        );
        assert_eq!(json["sensorId"], 3);
        assert_eq!(json["value"], 1.25);
        assert_eq!(json["duplicate"], true);
        assert!(json["timestamp"].as_str().unwrap().starts_with("2024-05-01T12:30:00"));
    }

    #[test]
    fn test_payload_omits_duplicate_and_keeps_null_value() {
        let json = serde_json::to_value(reading(None, true).payload()).unwrap();
        assert!(json.get("duplicate").is_none());
        assert!(json["value"].is_null());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        ContainerConfig, ContainerState, DeviceConfig, ErrorDefinition, ProbabilityParams,
        SensorConfig, SimulationBlueprint, TransportKind,
    };
    use orchestrator::{OrchestratorError, Simulation, StopOutcome};
    use telemetry::RecordingSink;
    use tokio::time::Instant;

    const PLANT: &str = r#"
[transport.mqtt]
host = "localhost"
topic_prefix = "plant/"

[[containers]]
id = 1
name = "boiler-room"

[[containers.devices]]
id = 10
name = "boiler"

[[containers.devices.sensors]]
id = 100
name = "temperature"
unit = 1
base_value = 25.0
variation_range = 5.0
change_rate = 0.5
interval_secs = 1.0

[[containers]]
id = 2
name = "drifting"

[[containers.devices]]
id = 20
name = "ph meter"

[[containers.devices.sensors]]
id = 200
name = "ph"
base_value = 25.0
variation_range = 5.0
change_rate = 0.5
interval_secs = 1.0

[containers.devices.sensors.error_definition]
type = "drift"
after_n_iterations = 5
average_drift_rate = 1.0
variation_range = 0.1

[[containers]]
id = 3
name = "empty"
"#;

    fn plant() -> Simulation {
        let blueprint = ConfigLoader::load_from_str(PLANT, ConfigFormat::Toml).unwrap();
        Simulation::from_blueprint(&blueprint).with_seed(42)
    }

    fn single_sensor(sensor: SensorConfig) -> SimulationBlueprint {
        SimulationBlueprint {
            containers: vec![ContainerConfig::new(1, "lab")
                .with_device(DeviceConfig::new(1, "bench").with_sensor(sensor))],
            ..Default::default()
        }
    }

    /// 1 device, 1 sensor, 3 ticks → 3 messages, 3 publishes, all in window
    #[tokio::test(start_paused = true)]
    async fn test_three_tick_scenario_from_config() {
        let mut sim = plant();
        let sink = RecordingSink::new("broker");
        let container = sim.container_mut(1).unwrap();

        container
            .start_with_sink(TransportKind::Mqtt, sink.clone())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(container.message_count(), 3);
        assert_eq!(sink.count(), 3);
        for reading in sink.published() {
            assert_eq!(reading.container_id, 1);
            assert_eq!(reading.device_name, "boiler");
            let value = reading.value.unwrap();
            assert!((20.0..=30.0).contains(&value), "value {value} out of window");
        }
        let sequences: Vec<u64> = sink.published().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);

        assert_eq!(
            container.stop().await,
            StopOutcome::Stopped { message_count: 3 }
        );
    }

    /// Drift onset after tick 5, shifts at ticks 10 and 20 only
    #[tokio::test(start_paused = true)]
    async fn test_drift_moves_base_twice_in_25_ticks() {
        let mut sim = plant();
        let container = sim.container_mut(2).unwrap();
        container.start(TransportKind::Log).await.unwrap();
        tokio::time::sleep(Duration::from_millis(25_500)).await;

        let status = &container.sensor_status()[0];
        assert_eq!(status.ticks, 25);
        assert!(
            status.base_value > 26.7 && status.base_value < 27.3,
            "base {}",
            status.base_value
        );
        assert_eq!(container.message_count(), 25);
        container.stop().await;
    }

    #[tokio::test]
    async fn test_container_without_devices_stays_inactive() {
        let mut sim = plant();
        let err = sim.start(3, TransportKind::Log).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NoDevices { container_id: 3 }));

        let snapshot = sim.container(3).unwrap().snapshot();
        assert!(!snapshot.is_active);
        assert_eq!(snapshot.state, ContainerState::Inactive);
    }

    /// Stop returns within the shutdown bound however many sensors run
    #[tokio::test(start_paused = true)]
    async fn test_stop_is_bounded_with_many_sensors() {
        let mut device = DeviceConfig::new(1, "array");
        for id in 0..200 {
            device = device.with_sensor(
                SensorConfig::new(id, format!("cell-{id}"), 3.3)
                    .with_interval(Duration::from_millis(100 + u64::from(id))),
            );
        }
        let blueprint = SimulationBlueprint {
            containers: vec![ContainerConfig::new(1, "battery").with_device(device)],
            ..Default::default()
        };
        let mut sim = Simulation::from_blueprint(&blueprint);
        sim.start(1, TransportKind::Log).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let begun = Instant::now();
        let outcome = sim.stop(1).await.unwrap();
        assert!(begun.elapsed() <= Duration::from_millis(5100));
        assert!(outcome.message_count().unwrap() > 0);

        let snapshot = sim.container(1).unwrap().snapshot();
        assert!(!snapshot.is_active);
        assert!(snapshot.start_time.is_none());
    }

    /// Nothing is counted or published once stop has returned
    #[tokio::test(start_paused = true)]
    async fn test_no_readings_after_stop() {
        let mut sim = plant();
        let sink = RecordingSink::new("broker");
        let container = sim.container_mut(1).unwrap();
        container
            .start_with_sink(TransportKind::Mqtt, sink.clone())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        container.stop().await;

        let count = container.message_count();
        let published = sink.count();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(container.message_count(), count);
        assert_eq!(sink.count(), published);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_count_and_bumps_epoch() {
        let mut sim = plant();
        sim.start(1, TransportKind::Log).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        sim.stop(1).await.unwrap();
        assert_eq!(sim.container(1).unwrap().message_count(), 2);

        sim.start(1, TransportKind::Log).await.unwrap();
        let snapshot = sim.container(1).unwrap().snapshot();
        assert_eq!(snapshot.epoch, 2);
        assert_eq!(snapshot.message_count, 0);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(sim.container(1).unwrap().message_count(), 1);
        sim.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_mcar_extremes() {
        let always = SensorConfig::new(1, "flaky", 10.0)
            .with_interval(Duration::from_secs(1))
            .with_error(ErrorDefinition::Mcar(ProbabilityParams { probability: 1.0 }));
        let mut sim = Simulation::from_blueprint(&single_sensor(always));
        let sink = RecordingSink::new("broker");
        let container = sim.container_mut(1).unwrap();
        container
            .start_with_sink(TransportKind::Mqtt, sink.clone())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5500)).await;
        container.stop().await;

        assert_eq!(sink.count(), 5);
        assert!(sink.published().iter().all(|r| r.value.is_none()));
        assert_eq!(container.reading_summary().total_missing, 5);

        let never = SensorConfig::new(1, "solid", 10.0)
            .with_interval(Duration::from_secs(1))
            .with_error(ErrorDefinition::Mcar(ProbabilityParams { probability: 0.0 }));
        let mut sim = Simulation::from_blueprint(&single_sensor(never));
        let sink = RecordingSink::new("broker");
        let container = sim.container_mut(1).unwrap();
        container
            .start_with_sink(TransportKind::Mqtt, sink.clone())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5500)).await;
        container.stop().await;

        assert_eq!(sink.count(), 5);
        assert!(sink.published().iter().all(|r| r.value.is_some()));
    }

    /// Duplicates: counted once, published twice, never on adjacent ticks
    #[tokio::test(start_paused = true)]
    async fn test_duplicates_spaced_and_published_twice() {
        let sensor = SensorConfig::new(1, "echo", 10.0)
            .with_interval(Duration::from_secs(1))
            .with_error(ErrorDefinition::DuplicateData(ProbabilityParams { probability: 1.0 }));
        let mut sim = Simulation::from_blueprint(&single_sensor(sensor));
        let sink = RecordingSink::new("broker");
        let container = sim.container_mut(1).unwrap();
        container
            .start_with_sink(TransportKind::Mqtt, sink.clone())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        container.stop().await;

        assert_eq!(container.message_count(), 10);
        // Ticks 1, 4, 7 and 10 duplicate
        assert_eq!(sink.count(), 14);

        let mut duplicated: Vec<u64> = sink
            .published()
            .iter()
            .filter(|r| r.duplicate)
            .map(|r| r.sequence)
            .collect();
        duplicated.dedup();
        assert_eq!(duplicated, vec![1, 4, 7, 10]);
    }

    /// Demo mode can be flipped while running; the observer never stops
    #[tokio::test(start_paused = true)]
    async fn test_demo_mode_toggle_mid_run() {
        let mut sim = plant();
        let options = sim.options().clone();
        let sink = RecordingSink::new("broker");
        let container = sim.container_mut(1).unwrap();
        container
            .start_with_sink(TransportKind::Mqtt, sink.clone())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        options.set_demo_mode(true);
        tokio::time::sleep(Duration::from_secs(2)).await;
        options.set_demo_mode(false);
        tokio::time::sleep(Duration::from_secs(1)).await;
        container.stop().await;

        assert_eq!(container.message_count(), 5);
        assert_eq!(sink.count(), 3);
        assert_eq!(container.live_view().observed(), 5);
        let (_, metrics) = container.sink_metrics().unwrap();
        assert_eq!(metrics.suppressed, 2);
        assert_eq!(metrics.attempts(), 5);
    }

    #[tokio::test]
    async fn test_mqtt_without_broker_leaves_state_untouched() {
        let mut blueprint = ConfigLoader::load_from_str(PLANT, ConfigFormat::Toml).unwrap();
        blueprint.transport.mqtt.host = None;
        let mut sim = Simulation::from_blueprint(&blueprint);

        let err = sim.start(1, TransportKind::Mqtt).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::TransportConnect { .. }));
        assert_eq!(sim.container(1).unwrap().snapshot().epoch, 0);
    }
}

#[cfg(test)]
mod sample_config_tests {
    use std::path::Path;

    use config_loader::ConfigLoader;
    use contracts::ErrorDefinition;

    #[test]
    fn test_sample_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../sim.toml");
        let blueprint = ConfigLoader::load_from_path(&path).unwrap();

        assert_eq!(blueprint.containers.len(), 2);
        assert!(!blueprint.options.demo_mode);
        assert!(blueprint.transport.mqtt.host.is_none());
        let kinds: Vec<&str> = blueprint
            .containers
            .iter()
            .flat_map(|c| &c.devices)
            .flat_map(|d| &d.sensors)
            .map(|s| s.error_definition.as_ref().map_or("no_error", ErrorDefinition::kind))
            .collect();
        assert_eq!(
            kinds,
            vec!["no_error", "mcar", "drift", "anomaly", "duplicate_data"]
        );
    }
}

#[cfg(test)]
mod export_tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use contracts::{DeviceConfig, ErrorDefinition, ProbabilityParams, SensorConfig};
    use simulator::bulk::{generate_bulk, generate_device_bulk};
    use telemetry::{export_to_path, ExportFormat};

    fn device() -> DeviceConfig {
        DeviceConfig::new(4, "hvac")
            .with_sensor(
                SensorConfig::new(1, "supply", 18.0)
                    .with_unit(1)
                    .with_interval(Duration::from_secs(30)),
            )
            .with_sensor(
                SensorConfig::new(2, "return", 24.0)
                    .with_interval(Duration::from_secs(30))
                    .with_error(ErrorDefinition::DuplicateData(ProbabilityParams {
                        probability: 1.0,
                    })),
            )
    }

    #[test]
    fn test_csv_export_expands_duplicates_and_sorts() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let readings: Vec<_> = generate_device_bulk(7, &device(), 6, start, Some(3))
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(readings.len(), 12);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        let rows = export_to_path(&readings, ExportFormat::Csv, &path).unwrap();

        // "return" duplicates on ticks 1 and 4
        assert_eq!(rows, 14);
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "timestamp,sensorId,sensorName,value,unit,deviceId,deviceName"
        );
        assert_eq!(lines.len(), 15);

        let timestamps: Vec<&str> = lines[1..]
            .iter()
            .map(|l| l.split(',').next().unwrap())
            .collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
    }

    #[test]
    fn test_json_export_is_nested_by_device_and_sensor() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let device = device();
        let readings = generate_bulk(7, &device, &device.sensors[0], 5, start, Some(1)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.json");
        export_to_path(&readings, ExportFormat::Json, &path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let devices = json["devices"].as_array().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0]["deviceId"], 4);
        let records = devices[0]["sensors"][0]["records"].as_array().unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0]["sensorName"], "supply");
    }
}
