//! Transport driver - keeps a connection alive for the length of a run
//!
//! Connection-oriented transports (MQTT) need their event loop polled in the
//! background. The driver owns that task and reports the first fatal error.

use std::time::Duration;

use rumqttc::{Event, Outgoing};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::sinks::MqttEventLoop;

/// Background transport task handle
pub struct TransportDriver {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
    failure: Option<watch::Receiver<Option<String>>>,
}

impl TransportDriver {
    /// Driver for transports without a persistent connection
    pub fn idle() -> Self {
        Self {
            token: CancellationToken::new(),
            task: None,
            failure: None,
        }
    }

    /// Poll an MQTT event loop until disconnect, cancel or error
    pub fn spawn_mqtt(event_loop: MqttEventLoop) -> Self {
        let token = CancellationToken::new();
        let (failure_tx, failure_rx) = watch::channel(None);
        let task_token = token.clone();

        let task = tokio::spawn(async move {
            let MqttEventLoop {
                mut event_loop,
                client_id,
            } = event_loop;
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    event = event_loop.poll() => match event {
                        Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                            debug!(client_id = %client_id, "mqtt disconnect sent");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(client_id = %client_id, error = %e, "mqtt connection lost");
                            let _ = failure_tx.send(Some(e.to_string()));
                            break;
                        }
                    },
                }
            }
        });

        Self {
            token,
            task: Some(task),
            failure: Some(failure_rx),
        }
    }

    /// Resolves with the error message once the transport has failed
    ///
    /// Never resolves for idle drivers or after a clean disconnect.
    pub async fn failed(&mut self) -> String {
        if let Some(rx) = self.failure.as_mut() {
            if let Ok(message) = rx.wait_for(Option::is_some).await {
                return message.clone().unwrap_or_default();
            }
        }
        std::future::pending().await
    }

    /// Give the task `grace` to flush (e.g. a queued disconnect), then cancel it
    pub async fn shutdown(mut self, grace: Duration) {
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                self.token.cancel();
                let _ = task.await;
            }
        }
    }
}

impl Drop for TransportDriver {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
