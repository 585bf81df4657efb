//! IotHubSink - device-to-cloud messages over the IoT Hub HTTPS API
//!
//! Each device authenticates with a SAS token derived from its own
//! connection string. Devices without credentials are skipped.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use contracts::{Ack, ContainerConfig, ContractError, DeviceId, IotHubSettings, Reading, TelemetrySink};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::error::{Result, TelemetryError};

const TRANSPORT: &str = "iothub";

type HmacSha256 = Hmac<Sha256>;

/// Parsed `HostName=…;DeviceId=…;SharedAccessKey=…`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub host_name: String,
    pub device_id: String,
    pub shared_access_key: String,
}

impl FromStr for ConnectionString {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts: HashMap<&str, &str> = HashMap::new();
        for part in s.split(';').filter(|p| !p.trim().is_empty()) {
            // Keys are base64 and may themselves contain '='.
            let (key, value) = part.split_once('=').ok_or_else(|| {
                TelemetryError::invalid_connection_string(format!("segment '{part}' has no '='"))
            })?;
            parts.insert(key.trim(), value.trim());
        }

        let field = |name: &str| {
            parts
                .get(name)
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
                .ok_or_else(|| TelemetryError::invalid_connection_string(format!("{name} missing")))
        };

        Ok(Self {
            host_name: field("HostName")?,
            device_id: field("DeviceId")?,
            shared_access_key: field("SharedAccessKey")?,
        })
    }
}

/// Build a shared access signature for `resource_uri`
///
/// `key` is the raw (base64-decoded) shared access key, `expiry` a unix
/// timestamp in seconds.
pub fn generate_sas_token(resource_uri: &str, key: &[u8], expiry: i64) -> Result<String> {
    let encoded_uri = urlencoding::encode(resource_uri);
    let to_sign = format!("{encoded_uri}\n{expiry}");

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| TelemetryError::invalid_connection_string(e.to_string()))?;
    mac.update(to_sign.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    Ok(format!(
        "SharedAccessSignature sr={encoded_uri}&sig={}&se={expiry}",
        urlencoding::encode(&signature)
    ))
}

struct DeviceCredentials {
    host_name: String,
    device_id: String,
    key: Vec<u8>,
}

/// IoT Hub publisher for all devices of one container
pub struct IotHubSink {
    name: String,
    client: reqwest::Client,
    api_version: String,
    sas_ttl: Duration,
    devices: HashMap<DeviceId, DeviceCredentials>,
}

impl IotHubSink {
    /// Prepare credentials for every device of `container`
    ///
    /// # Errors
    /// `NotConfigured` without a hub host name.
    pub fn new(container: &ContainerConfig, settings: &IotHubSettings) -> Result<Self> {
        let hub_host = settings
            .host_name
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| TelemetryError::not_configured(TRANSPORT, "hub host name missing"))?;

        let mut devices = HashMap::new();
        for device in &container.devices {
            let Some(raw) = device.connection_string.as_deref() else {
                continue;
            };
            let credentials = raw.parse::<ConnectionString>().and_then(|cs| {
                let key = STANDARD.decode(&cs.shared_access_key).map_err(|e| {
                    TelemetryError::invalid_connection_string(format!("SharedAccessKey: {e}"))
                })?;
                Ok(DeviceCredentials {
                    host_name: cs.host_name,
                    device_id: cs.device_id,
                    key,
                })
            });
            match credentials {
                Ok(credentials) => {
                    devices.insert(device.id, credentials);
                }
                Err(e) => warn!(
                    container_id = container.id,
                    device_id = device.id,
                    error = %e,
                    "ignoring device credentials"
                ),
            }
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TelemetryError::connect(TRANSPORT, e.to_string()))?;

        info!(
            container_id = container.id,
            hub = %hub_host,
            devices = devices.len(),
            "iothub sink ready"
        );

        Ok(Self {
            name: format!("iothub:{hub_host}"),
            client,
            api_version: settings.api_version.clone(),
            sas_ttl: Duration::from_secs(settings.sas_ttl_secs.max(60)),
            devices,
        })
    }

    /// Devices that have usable credentials
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

impl TelemetrySink for IotHubSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&mut self, reading: &Reading) -> std::result::Result<Ack, ContractError> {
        let Some(device) = self.devices.get(&reading.device_id) else {
            debug!(device_id = reading.device_id, "no credentials, publish skipped");
            return Ok(Ack::Skipped);
        };

        let resource_uri = format!("{}/devices/{}", device.host_name, device.device_id);
        let expiry = Utc::now().timestamp() + self.sas_ttl.as_secs() as i64;
        let token = generate_sas_token(&resource_uri, &device.key, expiry)
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;

        let url = format!(
            "https://{}/devices/{}/messages/events?api-version={}",
            device.host_name,
            urlencoding::encode(&device.device_id),
            self.api_version
        );

        self.client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, token)
            .json(&reading.payload())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;

        Ok(Ack::Delivered)
    }

    async fn close(&mut self) -> std::result::Result<(), ContractError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use contracts::DeviceConfig;

    use super::*;

    const KEY_B64: &str = "c2VjcmV0LWtleS1mb3ItdGVzdHM=";

    #[test]
    fn test_parse_connection_string() {
        let cs: ConnectionString = format!(
            "HostName=hub.azure-devices.net;DeviceId=pump-1;SharedAccessKey={KEY_B64}"
        )
        .parse()
        .unwrap();
        assert_eq!(cs.host_name, "hub.azure-devices.net");
        assert_eq!(cs.device_id, "pump-1");
        assert_eq!(cs.shared_access_key, KEY_B64);
    }

    #[test]
    fn test_parse_connection_string_missing_key() {
        let err = "HostName=h;DeviceId=d"
            .parse::<ConnectionString>()
            .unwrap_err();
        assert!(err.to_string().contains("SharedAccessKey missing"));
    }

    #[test]
    fn test_sas_token_shape_and_determinism() {
        let key = STANDARD.decode(KEY_B64).unwrap();
        let a = generate_sas_token("hub.azure-devices.net/devices/pump-1", &key, 1_700_000_000)
            .unwrap();
        let b = generate_sas_token("hub.azure-devices.net/devices/pump-1", &key, 1_700_000_000)
            .unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with(
            "SharedAccessSignature sr=hub.azure-devices.net%2Fdevices%2Fpump-1&sig="
        ));
        assert!(a.ends_with("&se=1700000000"));

        let c = generate_sas_token("hub.azure-devices.net/devices/pump-1", &key, 1_700_000_001)
            .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_missing_hub_host_is_not_configured() {
        let container = ContainerConfig::new(1, "plant");
        let err = IotHubSink::new(&container, &IotHubSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, TelemetryError::NotConfigured { .. }));
    }

    #[tokio::test]
    async fn test_devices_without_credentials_are_skipped() {
        let mut with_creds = DeviceConfig::new(1, "pump");
        with_creds.connection_string = Some(format!(
            "HostName=hub.azure-devices.net;DeviceId=pump;SharedAccessKey={KEY_B64}"
        ));
        let mut broken = DeviceConfig::new(2, "valve");
        broken.connection_string = Some("HostName=hub".to_string());
        let container = ContainerConfig::new(1, "plant")
            .with_device(with_creds)
            .with_device(broken)
            .with_device(DeviceConfig::new(3, "meter"));

        let settings = IotHubSettings {
            host_name: Some("hub.azure-devices.net".to_string()),
            ..IotHubSettings::default()
        };
        let mut sink = IotHubSink::new(&container, &settings).unwrap();
        assert_eq!(sink.device_count(), 1);

        let reading = Reading {
            container_id: 1,
            device_id: 3,
            device_name: "meter".to_string(),
            sensor_id: 1,
            sensor_name: "kwh".to_string(),
            timestamp: Utc::now(),
            value: Some(1.0),
            unit: 9,
            duplicate: false,
            sequence: 1,
        };
        assert_eq!(sink.publish(&reading).await.unwrap(), Ack::Skipped);
    }
}
