//! Transport selection and settings

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Outbound interface chosen at container start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Azure IoT Hub device-to-cloud over HTTPS
    Iothub,
    /// MQTT broker
    Mqtt,
    /// Local tracing output only, no network
    Log,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Iothub => "iothub",
            TransportKind::Mqtt => "mqtt",
            TransportKind::Log => "log",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "iothub" => Ok(TransportKind::Iothub),
            "mqtt" => Ok(TransportKind::Mqtt),
            "log" => Ok(TransportKind::Log),
            other => Err(ContractError::config_validation(
                "interface",
                format!("unknown interface '{other}' (expected iothub, mqtt or log)"),
            )),
        }
    }
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    5
}

/// MQTT broker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttSettings {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Prepended to the container name to form the topic
    #[serde(default)]
    pub topic_prefix: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: default_mqtt_port(),
            username: None,
            password: None,
            topic_prefix: String::new(),
            keep_alive_secs: default_keep_alive_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl MqttSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

fn default_api_version() -> String {
    "2020-03-13".to_string()
}

fn default_sas_ttl_secs() -> u64 {
    3600
}

/// IoT Hub settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IotHubSettings {
    /// Hub host, e.g. `my-hub.azure-devices.net`
    #[serde(default)]
    pub host_name: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_sas_ttl_secs")]
    pub sas_ttl_secs: u64,
}

impl Default for IotHubSettings {
    fn default() -> Self {
        Self {
            host_name: None,
            api_version: default_api_version(),
            sas_ttl_secs: default_sas_ttl_secs(),
        }
    }
}

/// All transport settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportSettings {
    #[serde(default)]
    pub mqtt: MqttSettings,
    #[serde(default)]
    pub iothub: IotHubSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        assert_eq!("mqtt".parse::<TransportKind>().unwrap(), TransportKind::Mqtt);
        assert_eq!("IoTHub".parse::<TransportKind>().unwrap(), TransportKind::Iothub);
        assert!("kafka".parse::<TransportKind>().is_err());
        assert_eq!(TransportKind::Log.to_string(), "log");
    }

    #[test]
    fn test_defaults() {
        let settings: TransportSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.mqtt.port, 1883);
        assert!(settings.mqtt.host.is_none());
        assert_eq!(settings.iothub.sas_ttl_secs, 3600);
        assert_eq!(settings.mqtt.connect_timeout(), Duration::from_secs(5));
    }
}
