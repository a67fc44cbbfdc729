//! MQTT accessory bridge.
//!
//! Topics live under `<base_topic>/<device slug>`:
//! - `<base>/<characteristic>`: state, pushed on change and after reads
//! - `<base>/<characteristic>/get`: read requests from the smart-home side
//! - `<base>/info`: retained accessory information (JSON)

use super::{AccessoryBridge, AccessoryInfo, Characteristic, CharacteristicValue, ReadHandler};
use crate::config::MqttConfig;
use crate::error::Result;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Message received from the MQTT broker.
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: String,
}

/// Events forwarded from the MQTT event loop.
#[derive(Debug, Clone)]
pub enum MqttEvent {
    /// The broker acknowledged a (re)connection; subscriptions must be renewed.
    Connected,
    Message(MqttMessage),
}

/// Thin wrapper owning the rumqttc client and its event loop.
pub struct MqttClient {
    client: AsyncClient,
    event_loop: EventLoop,
}

impl MqttClient {
    pub fn new(config: &MqttConfig) -> Self {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, 100);

        Self { client, event_loop }
    }

    /// Get a clone of the async client for publishing from other tasks.
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Drive the event loop, forwarding connections and publishes to `tx`.
    pub async fn run(mut self, tx: mpsc::Sender<MqttEvent>) {
        info!("[MQTT] Starting event loop");

        loop {
            let forwarded = match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("[MQTT] Connected");
                    Some(MqttEvent::Connected)
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match String::from_utf8(publish.payload.to_vec()) {
                        Ok(payload) => Some(MqttEvent::Message(MqttMessage {
                            topic: publish.topic.clone(),
                            payload,
                        })),
                        Err(e) => {
                            warn!("[MQTT] Invalid UTF-8 in payload on {}: {}", publish.topic, e);
                            None
                        }
                    }
                }
                Ok(_) => None,
                Err(e) => {
                    error!("[MQTT] Connection error: {:?}", e);
                    // Wait before reconnecting
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    None
                }
            };

            if let Some(event) = forwarded
                && tx.send(event).await.is_err()
            {
                error!("[MQTT] Event channel closed");
                break;
            }
        }
    }
}

/// Lowercase, dash-separated topic segment for a display name.
pub fn topic_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "sensor".to_string()
    } else {
        slug.to_string()
    }
}

/// [`AccessoryBridge`] speaking to a smart-home hub over MQTT.
pub struct MqttBridge {
    client: AsyncClient,
    base_topic: String,
    handlers: RwLock<HashMap<Characteristic, ReadHandler>>,
    info_payload: RwLock<Option<String>>,
}

impl MqttBridge {
    fn new(client: AsyncClient, base_topic: &str, device_name: &str) -> Self {
        Self {
            client,
            base_topic: format!("{}/{}", base_topic, topic_slug(device_name)),
            handlers: RwLock::new(HashMap::new()),
            info_payload: RwLock::new(None),
        }
    }

    /// Connect to the broker and serve read requests in the background.
    ///
    /// Returns the bridge and the handle of its background task, which can be
    /// aborted on shutdown.
    pub fn start(config: &MqttConfig, device_name: &str) -> (Arc<Self>, JoinHandle<()>) {
        info!(
            "[MQTT] Connecting to {}:{}",
            config.broker_host, config.broker_port
        );
        let mqtt_client = MqttClient::new(config);
        let bridge = Arc::new(Self::new(mqtt_client.client(), &config.base_topic, device_name));

        let worker = bridge.clone();
        let handle = tokio::spawn(async move {
            let (tx, mut rx) = mpsc::channel::<MqttEvent>(64);
            let mqtt_loop = tokio::spawn(mqtt_client.run(tx));

            while let Some(event) = rx.recv().await {
                match event {
                    MqttEvent::Connected => worker.on_connected(),
                    MqttEvent::Message(msg) => worker.on_message(&msg.topic),
                }
            }

            mqtt_loop.abort();
        });

        (bridge, handle)
    }

    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    pub fn state_topic(&self, characteristic: Characteristic) -> String {
        format!("{}/{}", self.base_topic, characteristic)
    }

    pub fn get_topic(&self, characteristic: Characteristic) -> String {
        format!("{}/{}/get", self.base_topic, characteristic)
    }

    pub fn info_topic(&self) -> String {
        format!("{}/info", self.base_topic)
    }

    /// Renew read-request subscriptions and the retained accessory info.
    fn on_connected(&self) {
        let characteristics: Vec<Characteristic> = self.handlers.read().keys().copied().collect();
        for characteristic in characteristics {
            if let Err(e) = self.subscribe_reads(characteristic) {
                warn!("[MQTT] Failed to subscribe to {}: {}", self.get_topic(characteristic), e);
            }
        }

        let info = self.info_payload.read().clone();
        if let Some(payload) = info
            && let Err(e) = self.publish(&self.info_topic(), payload, true)
        {
            warn!("[MQTT] Failed to publish accessory info: {}", e);
        }
    }

    fn on_message(&self, topic: &str) {
        let Some((characteristic, value)) = self.answer_read(topic) else {
            debug!("[MQTT] Ignoring message on {}", topic);
            return;
        };
        // A read may consume the state, so the answer replaces the retained value
        if let Err(e) = self.publish_state(characteristic, value) {
            warn!("[MQTT] Failed to answer read of {}: {}", characteristic, e);
        }
    }

    fn subscribe_reads(&self, characteristic: Characteristic) -> Result<()> {
        self.client
            .try_subscribe(self.get_topic(characteristic), QoS::AtMostOnce)?;
        Ok(())
    }

    /// Resolve a read request topic to its characteristic and current value.
    fn answer_read(&self, topic: &str) -> Option<(Characteristic, CharacteristicValue)> {
        let name = topic
            .strip_prefix(&self.base_topic)?
            .strip_prefix('/')?
            .strip_suffix("/get")?;
        let characteristic: Characteristic = name.parse().ok()?;

        let handlers = self.handlers.read();
        let handler = handlers.get(&characteristic)?;
        Some((characteristic, handler()))
    }

    /// Publish a state value, retained so new subscribers see the latest one.
    fn publish_state(
        &self,
        characteristic: Characteristic,
        value: CharacteristicValue,
    ) -> Result<()> {
        self.publish(&self.state_topic(characteristic), value.to_string(), true)
    }

    fn publish(&self, topic: &str, payload: String, retain: bool) -> Result<()> {
        debug!("[MQTT] Publishing to {}: {}", topic, payload);
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload)?;
        Ok(())
    }

    fn store_info(&self, info: &AccessoryInfo) -> Result<String> {
        let payload = serde_json::to_string(info)?;
        *self.info_payload.write() = Some(payload.clone());
        Ok(payload)
    }
}

impl AccessoryBridge for MqttBridge {
    fn announce(&self, info: &AccessoryInfo) {
        let result = self
            .store_info(info)
            .and_then(|payload| self.publish(&self.info_topic(), payload, true));
        if let Err(e) = result {
            warn!("[MQTT] Failed to publish accessory info: {}", e);
        }
    }

    /// Subscribes right away; `on_connected` renews it after reconnects.
    fn register_read_handler(&self, characteristic: Characteristic, handler: ReadHandler) {
        self.handlers.write().insert(characteristic, handler);
        if let Err(e) = self.subscribe_reads(characteristic) {
            warn!("[MQTT] Failed to subscribe to {}: {}", self.get_topic(characteristic), e);
        }
    }

    fn push_update(&self, characteristic: Characteristic, value: CharacteristicValue) {
        if let Err(e) = self.publish_state(characteristic, value) {
            warn!("[MQTT] Failed to push {}: {}", characteristic, e);
        }
    }
}
