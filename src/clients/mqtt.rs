//! Message-bus stage: MQTT client connection.
//!
//! Establishes the broker session, keeps the event loop polling in a
//! background task, and tracks connectivity for health probes. Payload
//! semantics belong to the IoT handlers, not here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::error::CoreError;
use crate::lifecycle::{ManagedService, Stage};

/// How long to wait for the broker's ConnAck before giving up.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// MQTT broker connection managed by the orchestrator.
pub struct MqttService {
    settings: Arc<Settings>,
    client: Mutex<Option<AsyncClient>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
}

impl std::fmt::Debug for MqttService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttService")
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl MqttService {
    /// Builds an unconnected client from the settings snapshot.
    #[must_use]
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            client: Mutex::new(None),
            driver: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the broker session is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn options(&self) -> MqttOptions {
        let client_id = format!("{}-{}", self.settings.app_name, std::process::id());
        let mut options =
            MqttOptions::new(client_id, &self.settings.mqtt_host, self.settings.mqtt_port);
        options.set_keep_alive(Duration::from_secs(self.settings.mqtt_keepalive_secs));
        if let (Some(username), Some(password)) = (
            self.settings.mqtt_username.as_ref(),
            self.settings.mqtt_password.as_ref(),
        ) {
            options.set_credentials(username, password);
        }
        options
    }
}

#[async_trait]
impl ManagedService for MqttService {
    fn stage(&self) -> Stage {
        Stage::MessageBus
    }

    async fn start(&self) -> Result<(), CoreError> {
        let (client, mut event_loop) = AsyncClient::new(self.options(), 64);

        // Gate readiness on the broker's ConnAck.
        let deadline = tokio::time::Instant::now() + CONNECT_TIMEOUT;
        loop {
            let polled = tokio::time::timeout_at(deadline, event_loop.poll())
                .await
                .map_err(|_| {
                    CoreError::Internal("timed out waiting for broker ConnAck".to_string())
                })?;
            match polled {
                Ok(Event::Incoming(Packet::ConnAck(_))) => break,
                Ok(_) => {}
                Err(error) => {
                    return Err(CoreError::Internal(format!("mqtt connect failed: {error}")));
                }
            }
        }

        let topics = self.settings.mqtt_topics();
        for topic in [&topics.sensors, &topics.actuators, &topics.status] {
            client
                .subscribe(topic.as_str(), QoS::AtLeastOnce)
                .await
                .map_err(|e| CoreError::Internal(format!("mqtt subscribe failed: {e}")))?;
        }

        self.connected.store(true, Ordering::SeqCst);
        let connected = Arc::clone(&self.connected);
        let driver = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(_) => {}
                    Err(error) => {
                        connected.store(false, Ordering::SeqCst);
                        tracing::warn!(error = %error, "mqtt event loop stopped");
                        break;
                    }
                }
            }
        });

        *self.client.lock().await = Some(client);
        *self.driver.lock().await = Some(driver);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(client) = self.client.lock().await.take() {
            client
                .disconnect()
                .await
                .map_err(|e| CoreError::Internal(format!("mqtt disconnect failed: {e}")))?;
        }
        if let Some(driver) = self.driver.lock().await.take() {
            driver.abort();
        }
        Ok(())
    }

    async fn ping(&self) -> bool {
        self.is_connected()
    }
}
