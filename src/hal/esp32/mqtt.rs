//! MQTT transport for ESP32-C3.
//!
//! Implements [`MqttClient`] over esp-idf-svc's `EspMqttClient`. Every
//! `connect` builds a fresh client with the last will configured, spawns a
//! thread that drains its event connection, and waits for the broker's
//! answer up to the connect timeout. `disconnect` drops the client, which
//! ends the event thread.
//!
//! # Example
//!
//! ```ignore
//! use rs_fanctl::hal::esp32::Esp32Mqtt;
//!
//! let app = FanApp::new(pwm, Esp32Mqtt::new(), storage, mac);
//! // The session calls connect/subscribe/publish from app.tick()
//! ```

use crate::traits::{ConnectOptions, LinkLatch, MqttClient, MqttMessage, QoS};
use esp_idf_svc::mqtt::client::{
    EspMqttClient, EspMqttConnection, EventPayload, LwtConfiguration, MqttClientConfiguration,
};
use log::{debug, info, warn};
use std::sync::mpsc::{channel, sync_channel, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Stack for the event thread; esp-idf threads default to a few KiB.
const EVENT_THREAD_STACK: usize = 6 * 1024;

// ============================================================================
// Errors
// ============================================================================

/// Error type for ESP32 MQTT operations.
#[derive(Debug)]
pub struct Esp32MqttError(pub String);

impl core::fmt::Display for Esp32MqttError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "MQTT error: {}", self.0)
    }
}

impl std::error::Error for Esp32MqttError {}

fn esp_err(e: impl core::fmt::Debug) -> Esp32MqttError {
    Esp32MqttError(format!("{:?}", e))
}

fn to_esp_qos(qos: QoS) -> esp_idf_svc::mqtt::client::QoS {
    match qos {
        QoS::AtMostOnce => esp_idf_svc::mqtt::client::QoS::AtMostOnce,
        QoS::AtLeastOnce => esp_idf_svc::mqtt::client::QoS::AtLeastOnce,
    }
}

// ============================================================================
// Client
// ============================================================================

/// MQTT transport backed by the ESP-IDF client.
#[derive(Default)]
pub struct Esp32Mqtt {
    client: Option<EspMqttClient<'static>>,
    message_rx: Option<Receiver<MqttMessage>>,
    link: Arc<LinkLatch>,
}

impl Esp32Mqtt {
    /// Create a disconnected transport.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MqttClient for Esp32Mqtt {
    type Error = Esp32MqttError;

    fn connect(&mut self, opts: &ConnectOptions) -> Result<(), Self::Error> {
        self.disconnect();

        let broker_url = format!("mqtt://{}:{}", opts.host, opts.port);
        let lwt = opts.last_will.as_ref().map(|will| LwtConfiguration {
            topic: will.topic.as_str(),
            payload: will.payload.as_slice(),
            qos: to_esp_qos(will.qos),
            retain: will.retain,
        });

        let mqtt_config = MqttClientConfiguration {
            client_id: Some(opts.client_id.as_str()),
            keep_alive_interval: Some(Duration::from_secs(opts.keep_alive_secs as u64)),
            network_timeout: Duration::from_millis(opts.connect_timeout_ms as u64),
            username: opts.username.as_deref(),
            password: opts.password.as_deref(),
            lwt,
            ..Default::default()
        };

        let (client, mut connection) =
            EspMqttClient::new(&broker_url, &mqtt_config).map_err(esp_err)?;

        let (message_tx, message_rx) = channel::<MqttMessage>();
        let (ack_tx, ack_rx) = sync_channel::<bool>(1);
        // The ESP-IDF client reconnects internally; the latch keeps a dropped
        // link down so the session redoes its own connect sequence.
        let link = Arc::new(LinkLatch::new());
        let flag = Arc::clone(&link);

        thread::Builder::new()
            .name("mqtt-events".into())
            .stack_size(EVENT_THREAD_STACK)
            .spawn(move || handle_mqtt_events(&mut connection, message_tx, ack_tx, &flag))
            .map_err(esp_err)?;

        match ack_rx.recv_timeout(Duration::from_millis(opts.connect_timeout_ms as u64)) {
            Ok(true) => {
                info!("MQTT connected to {}", broker_url);
                self.client = Some(client);
                self.message_rx = Some(message_rx);
                self.link = link;
                Ok(())
            }
            Ok(false) | Err(RecvTimeoutError::Disconnected) => {
                Err(Esp32MqttError(format!("{} refused connection", broker_url)))
            }
            Err(RecvTimeoutError::Timeout) => {
                Err(Esp32MqttError(format!("{} timed out", broker_url)))
            }
        }
    }

    fn disconnect(&mut self) {
        // Dropping the client stops it and ends the event thread
        self.client = None;
        self.message_rx = None;
        self.link.on_disconnected();
    }

    fn is_connected(&self) -> bool {
        self.client.is_some() && self.link.is_up()
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error> {
        if !self.is_connected() {
            return Err(Esp32MqttError("not connected".into()));
        }
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| Esp32MqttError("not connected".into()))?;
        let qos = if retain { QoS::AtLeastOnce } else { QoS::AtMostOnce };
        client
            .enqueue(topic, to_esp_qos(qos), retain, payload)
            .map_err(esp_err)?;
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| Esp32MqttError("not connected".into()))?;
        client.subscribe(topic, to_esp_qos(qos)).map_err(esp_err)?;
        Ok(())
    }

    fn try_recv(&mut self) -> Option<MqttMessage> {
        self.message_rx.as_ref()?.try_recv().ok()
    }
}

// ============================================================================
// Event Thread
// ============================================================================

fn handle_mqtt_events(
    connection: &mut EspMqttConnection,
    message_tx: Sender<MqttMessage>,
    ack_tx: SyncSender<bool>,
    link: &LinkLatch,
) {
    let mut ack_tx = Some(ack_tx);

    // Err means the client was dropped
    while let Ok(event) = connection.next() {
        match event.payload() {
            EventPayload::Connected(_) => {
                link.on_connected();
                if let Some(tx) = ack_tx.take() {
                    let _ = tx.send(true);
                }
            }
            EventPayload::Disconnected => {
                link.on_disconnected();
                if let Some(tx) = ack_tx.take() {
                    let _ = tx.send(false);
                }
                debug!("MQTT disconnected");
            }
            EventPayload::Received {
                topic: Some(topic),
                data,
                ..
            } => {
                let _ = message_tx.send(MqttMessage::new(topic, data.to_vec()));
            }
            EventPayload::Error(e) => warn!("MQTT event error: {:?}", e),
            _ => {}
        }
    }

    link.on_disconnected();
    debug!("MQTT event thread exited");
}
