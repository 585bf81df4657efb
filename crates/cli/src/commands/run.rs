//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{ContainerId, ContainerState, SimulationBlueprint, TransportKind};
use orchestrator::{Simulation, StopOutcome};
use std::time::Duration;
use tokio::time::Interval;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;

/// Execute the `run` command
pub async fn run_simulation(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut blueprint, args);
    let kind = TransportKind::from(args.interface);
    let ids = select_containers(&blueprint, &args.containers)?;

    info!(
        containers = ids.len(),
        interface = %kind,
        demo_mode = blueprint.options.demo_mode,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_run_plan(&blueprint, &ids, kind);
        return Ok(());
    }

    let mut simulation = Simulation::from_blueprint(&blueprint);
    if let Some(seed) = args.seed {
        simulation = simulation.with_seed(seed);
    }

    let started = simulation
        .start_many(&ids, kind)
        .await
        .into_iter()
        .filter(|(_, result)| result.is_ok())
        .count();
    if started == 0 {
        return Err(CliError::NothingStarted.into());
    }
    info!(started, requested = ids.len(), "Simulation running");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let deadline = run_deadline(args.duration);
    tokio::pin!(deadline);
    let mut ticker = (args.status_interval > 0).then(|| {
        let period = Duration::from_secs(args.status_interval);
        tokio::time::interval_at(tokio::time::Instant::now() + period, period)
    });

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                warn!("Received shutdown signal, stopping containers...");
                break;
            }
            _ = &mut deadline => {
                info!(duration_secs = args.duration, "Run duration elapsed");
                break;
            }
            _ = next_tick(&mut ticker) => {
                log_status(&simulation);
                if simulation.containers().all(|c| !c.is_active()) {
                    warn!("No container is active any more, exiting");
                    break;
                }
            }
        }
    }

    for (container_id, outcome) in simulation.stop_all().await {
        if let StopOutcome::ForcedReclaim { message_count } = outcome {
            warn!(
                container_id,
                message_count, "Container reclaimed before its background task finished"
            );
        }
    }

    print_summary(&simulation);
    info!(total_messages = simulation.total_messages(), "IoT simulator finished");
    Ok(())
}

/// Environment / flag overrides on top of the file
fn apply_overrides(blueprint: &mut SimulationBlueprint, args: &RunArgs) {
    let mqtt = &mut blueprint.transport.mqtt;
    if let Some(host) = &args.mqtt_host {
        info!(host = %host, "Overriding MQTT broker host");
        mqtt.host = Some(host.clone());
    }
    if let Some(port) = args.mqtt_port {
        info!(port, "Overriding MQTT broker port");
        mqtt.port = port;
    }
    if let Some(username) = &args.mqtt_username {
        mqtt.username = Some(username.clone());
    }
    if let Some(password) = &args.mqtt_password {
        mqtt.password = Some(password.clone());
    }
    if let Some(host) = &args.iothub_host {
        info!(host = %host, "Overriding IoT Hub host name");
        blueprint.transport.iothub.host_name = Some(host.clone());
    }
    if args.demo_mode {
        blueprint.options.demo_mode = true;
    }
}

/// Requested container ids, or every container when none were given
fn select_containers(
    blueprint: &SimulationBlueprint,
    requested: &[ContainerId],
) -> Result<Vec<ContainerId>> {
    if requested.is_empty() {
        return Ok(blueprint.containers.iter().map(|c| c.id).collect());
    }
    for &container_id in requested {
        if blueprint.container(container_id).is_none() {
            return Err(CliError::UnknownContainer { container_id }.into());
        }
    }
    Ok(requested.to_vec())
}

async fn run_deadline(duration_secs: u64) {
    if duration_secs == 0 {
        std::future::pending::<()>().await;
    } else {
        tokio::time::sleep(Duration::from_secs(duration_secs)).await;
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Setup Ctrl+C and SIGTERM signal handlers
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn log_status(simulation: &Simulation) {
    for container in simulation.containers() {
        let snapshot = container.snapshot();
        let (sink, published, dropped, failures) = match container.sink_metrics() {
            Some((name, m)) => (name, m.published, m.dropped, m.failures),
            None => (String::from("-"), 0, 0, 0),
        };
        info!(
            container_id = snapshot.container_id,
            state = %snapshot.state,
            messages = container.message_count(),
            sink = %sink,
            published,
            dropped,
            failures,
            "Container status"
        );
        if snapshot.state == ContainerState::Error {
            if let Some(error) = &snapshot.last_error {
                warn!(container_id = snapshot.container_id, error = %error, "Container in error state");
            }
        }
    }
}

/// Print configuration summary for dry-run mode
fn print_run_plan(blueprint: &SimulationBlueprint, ids: &[ContainerId], kind: TransportKind) {
    println!("\n=== Run Plan ===\n");
    println!("Interface: {kind}");
    println!("Demo mode: {}", blueprint.options.demo_mode);
    match kind {
        TransportKind::Mqtt => {
            let mqtt = &blueprint.transport.mqtt;
            println!(
                "MQTT broker: {}:{}",
                mqtt.host.as_deref().unwrap_or("(unset)"),
                mqtt.port
            );
        }
        TransportKind::Iothub => {
            println!(
                "IoT Hub: {}",
                blueprint
                    .transport
                    .iothub
                    .host_name
                    .as_deref()
                    .unwrap_or("(unset)")
            );
        }
        TransportKind::Log => {}
    }

    println!("\nContainers ({}):", ids.len());
    for container in ids.iter().filter_map(|&id| blueprint.container(id)) {
        println!(
            "  - {} ({}) - {} devices, {} sensors",
            container.id,
            container.name,
            container.devices.len(),
            container.sensor_count()
        );
    }
    println!();
}

fn print_summary(simulation: &Simulation) {
    println!("\n=== Simulation Summary ===\n");
    for container in simulation.containers() {
        let snapshot = container.snapshot();
        if snapshot.epoch == 0 {
            continue;
        }
        println!(
            "Container {} ({}): {} messages, state {}",
            snapshot.container_id, snapshot.name, snapshot.message_count, snapshot.state
        );
        if let Some((sink, m)) = container.sink_metrics() {
            println!(
                "  Sink {sink}: published {}, suppressed {}, skipped {}, failures {}, dropped {}",
                m.published, m.suppressed, m.skipped, m.failures, m.dropped
            );
        }
        if let Some(error) = &snapshot.last_error {
            println!("  Last error: {error}");
        }
        println!("{}", container.reading_summary());
    }
}
