//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::{ContainerId, DeviceId, SensorId, TransportKind};
use std::path::PathBuf;
use telemetry::ExportFormat;

/// IoT Simulator - synthetic sensor telemetry for containers of devices
#[derive(Parser, Debug)]
#[command(
    name = "iot-sim",
    author,
    version,
    about = "Synthetic IoT telemetry simulator",
    long_about = "Simulates containers of devices whose sensors emit a bounded random walk,\n\
                  optionally distorted by anomalies, missing values, duplicates or drift.\n\n\
                  Readings are published over MQTT or Azure IoT Hub, or written to the log."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "IOT_SIM_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "IOT_SIM_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run containers until interrupted or the duration elapses
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),

    /// Generate readings offline and write them to a file
    Export(ExportArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "sim.toml", env = "IOT_SIM_CONFIG")]
    pub config: PathBuf,

    /// Containers to start (repeatable; default: all)
    #[arg(short = 'C', long = "container")]
    pub containers: Vec<ContainerId>,

    /// Outbound interface
    #[arg(
        short,
        long,
        value_enum,
        default_value = "mqtt",
        env = "IOT_SIM_INTERFACE"
    )]
    pub interface: Interface,

    /// Stop after this many seconds (0 = until Ctrl-C)
    #[arg(long, default_value = "0", env = "IOT_SIM_DURATION")]
    pub duration: u64,

    /// Suppress outbound publishing; readings stay local
    #[arg(long, env = "IOT_SIM_DEMO_MODE")]
    pub demo_mode: bool,

    /// Seconds between status lines (0 = disabled)
    #[arg(long, default_value = "10", env = "IOT_SIM_STATUS_INTERVAL")]
    pub status_interval: u64,

    /// Seed for reproducible values
    #[arg(long, env = "IOT_SIM_SEED")]
    pub seed: Option<u64>,

    /// Override MQTT broker host from configuration
    #[arg(long, env = "MQTT_BROKER_ADDRESS")]
    pub mqtt_host: Option<String>,

    /// Override MQTT broker port from configuration
    #[arg(long, env = "MQTT_BROKER_PORT")]
    pub mqtt_port: Option<u16>,

    /// Override MQTT username from configuration
    #[arg(long, env = "MQTT_BROKER_USERNAME")]
    pub mqtt_username: Option<String>,

    /// Override MQTT password from configuration
    #[arg(long, env = "MQTT_BROKER_PASSWORD", hide_env_values = true)]
    pub mqtt_password: Option<String>,

    /// Override IoT Hub host name from configuration
    #[arg(long, env = "IOTHUB_HOST_NAME")]
    pub iothub_host: Option<String>,

    /// Validate configuration and exit without starting
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "IOT_SIM_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "sim.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "sim.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show detailed sensor information
    #[arg(long)]
    pub sensors: bool,
}

/// Arguments for the `export` command
#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "sim.toml")]
    pub config: PathBuf,

    /// Container to export
    #[arg(short = 'C', long)]
    pub container: ContainerId,

    /// Restrict to one device
    #[arg(long)]
    pub device: Option<DeviceId>,

    /// Restrict to one sensor
    #[arg(long)]
    pub sensor: Option<SensorId>,

    /// Logical readings per sensor
    #[arg(short = 'n', long = "sensor-count", default_value = "100")]
    pub count: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Output file
    #[arg(short, long)]
    pub out: PathBuf,

    /// First timestamp (RFC 3339; default: now)
    #[arg(long)]
    pub start: Option<chrono::DateTime<chrono::Utc>>,

    /// Seed for reproducible values
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Outbound interface
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interface {
    /// MQTT broker
    Mqtt,
    /// Azure IoT Hub over HTTPS
    Iothub,
    /// Tracing log only
    Log,
}

impl From<Interface> for TransportKind {
    fn from(interface: Interface) -> Self {
        match interface {
            Interface::Mqtt => TransportKind::Mqtt,
            Interface::Iothub => TransportKind::Iothub,
            Interface::Log => TransportKind::Log,
        }
    }
}

/// Export file format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl From<OutputFormat> for ExportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => ExportFormat::Json,
            OutputFormat::Csv => ExportFormat::Csv,
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::try_parse_from([
            "iot-sim",
            "run",
            "--config",
            "plant.toml",
            "-C",
            "1",
            "-C",
            "3",
            "--interface",
            "log",
            "--duration",
            "30",
            "--demo-mode",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config, PathBuf::from("plant.toml"));
        assert_eq!(args.containers, vec![1, 3]);
        assert_eq!(TransportKind::from(args.interface), TransportKind::Log);
        assert_eq!(args.duration, 30);
        assert!(args.demo_mode);
    }

    #[test]
    fn test_export_args_parse() {
        let cli = Cli::try_parse_from([
            "iot-sim",
            "export",
            "-C",
            "2",
            "--sensor-count",
            "50",
            "--format",
            "csv",
            "--out",
            "out.csv",
        ])
        .unwrap();

        let Commands::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.container, 2);
        assert_eq!(args.count, 50);
        assert_eq!(ExportFormat::from(args.format), ExportFormat::Csv);
        assert!(args.start.is_none());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["iot-sim", "-q", "-v", "validate"]).is_err());
    }
}
