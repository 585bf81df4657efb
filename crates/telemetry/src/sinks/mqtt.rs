//! MqttSink - publishes readings to a broker topic per container

use std::time::Duration;

use contracts::{Ack, ContainerId, ContractError, MqttSettings, Reading, TelemetrySink};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tracing::{debug, info, instrument};

use crate::error::{Result, TelemetryError};

const TRANSPORT: &str = "mqtt";

/// Request channel capacity between client and event loop
const CLIENT_CAPACITY: usize = 64;

/// Connected MQTT publisher
pub struct MqttSink {
    name: String,
    client: AsyncClient,
    topic: String,
}

/// Event loop half of a connected client, drive it with
/// [`TransportDriver::spawn_mqtt`](crate::TransportDriver::spawn_mqtt)
pub struct MqttEventLoop {
    pub(crate) event_loop: EventLoop,
    pub(crate) client_id: String,
}

impl MqttSink {
    /// Connect and wait for the broker's CONNACK
    ///
    /// # Errors
    /// - `NotConfigured` without a broker host
    /// - `Connect` on refusal, network error or timeout
    #[instrument(name = "mqtt_connect", skip(settings), fields(host = ?settings.host, port = settings.port))]
    pub async fn connect(
        container_id: ContainerId,
        container_name: &str,
        settings: &MqttSettings,
    ) -> Result<(Self, MqttEventLoop)> {
        let host = settings
            .host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| TelemetryError::not_configured(TRANSPORT, "broker address missing"))?;
        if settings.port == 0 {
            return Err(TelemetryError::not_configured(TRANSPORT, "broker port missing"));
        }

        let client_id = format!("container-{container_id}");
        let mut options = MqttOptions::new(client_id.clone(), host, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(5)));
        if let Some(username) = settings.username.as_deref().filter(|u| !u.is_empty()) {
            options.set_credentials(username, settings.password.clone().unwrap_or_default());
        }

        let (client, mut event_loop) = AsyncClient::new(options, CLIENT_CAPACITY);
        let handshake = async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        return if ack.code == ConnectReturnCode::Success {
                            Ok(())
                        } else {
                            Err(format!("broker refused connection: {:?}", ack.code))
                        };
                    }
                    Ok(_) => {}
                    Err(e) => return Err(e.to_string()),
                }
            }
        };

        match tokio::time::timeout(settings.connect_timeout(), handshake).await {
            Ok(Ok(())) => {}
            Ok(Err(message)) => return Err(TelemetryError::connect(TRANSPORT, message)),
            Err(_) => {
                return Err(TelemetryError::connect(
                    TRANSPORT,
                    format!("no CONNACK within {:?}", settings.connect_timeout()),
                ))
            }
        }

        let topic = format!("{}{}", settings.topic_prefix, container_name);
        info!(client_id = %client_id, topic = %topic, "mqtt connected");

        Ok((
            Self {
                name: format!("mqtt:{topic}"),
                client,
                topic,
            },
            MqttEventLoop {
                event_loop,
                client_id,
            },
        ))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl TelemetrySink for MqttSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&mut self, reading: &Reading) -> std::result::Result<Ack, ContractError> {
        let payload = serde_json::to_vec(&reading.payload())
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        self.client
            .publish(&self.topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        Ok(Ack::Delivered)
    }

    async fn close(&mut self) -> std::result::Result<(), ContractError> {
        if let Err(e) = self.client.disconnect().await {
            debug!(sink = %self.name, error = %e, "disconnect after connection loss");
        }
        Ok(())
    }
}
