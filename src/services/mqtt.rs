//! `rumqttc`-backed MQTT transport for desktop builds.
//!
//! [`RumqttcClient`] implements [`MqttClient`] on top of rumqttc's
//! synchronous `Client`. Each connection gets a dedicated thread that drives
//! the rumqttc event loop, forwards incoming publishes over a channel and
//! tracks the connected flag. The thread exits on the first error instead of
//! letting rumqttc reconnect, so retry policy stays with the
//! [`SessionManager`](crate::SessionManager).
//!
//! `connect` waits for the broker's CONNACK up to the configured timeout.
//! Never call it from an async task; the web handlers use
//! `spawn_blocking`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rumqttc::{Client, ConnectReturnCode, Event, MqttOptions, Outgoing, Packet};

use crate::traits::{ConnectOptions, LastWill, MqttClient, MqttMessage, QoS};

/// Request channel capacity between the client and its event loop.
const REQUEST_CAPACITY: usize = 16;

// ============================================================================
// Errors
// ============================================================================

/// Errors from [`RumqttcClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttError {
    /// The broker rejected the connection.
    Refused(String),
    /// No CONNACK within the connect timeout.
    Timeout,
    /// The event loop thread could not be started.
    Spawn(String),
    /// Operation needs a live connection.
    NotConnected,
    /// The request queue rejected a publish or subscribe.
    Request(String),
}

impl std::fmt::Display for MqttError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Refused(e) => write!(f, "MQTT connect refused: {}", e),
            Self::Timeout => write!(f, "MQTT connect timed out"),
            Self::Spawn(e) => write!(f, "MQTT event loop spawn failed: {}", e),
            Self::NotConnected => write!(f, "MQTT not connected"),
            Self::Request(e) => write!(f, "MQTT request error: {}", e),
        }
    }
}

impl std::error::Error for MqttError {}

// ============================================================================
// Client
// ============================================================================

/// Desktop MQTT transport.
///
/// # Example
///
/// ```ignore
/// use rs_fanctl::services::RumqttcClient;
/// use rs_fanctl::{FanApp, hal::{MockPwm, MockStore}};
///
/// let app = FanApp::new(MockPwm::new(), RumqttcClient::new(), MockStore::new(), mac);
/// ```
#[derive(Default)]
pub struct RumqttcClient {
    client: Option<Client>,
    incoming: Option<Receiver<MqttMessage>>,
    connected: Arc<AtomicBool>,
}

impl RumqttcClient {
    /// Create a disconnected client.
    pub fn new() -> Self {
        Self::default()
    }
}

fn to_rumqttc_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
    }
}

fn mqtt_options(opts: &ConnectOptions) -> MqttOptions {
    let mut options = MqttOptions::new(&opts.client_id, &opts.host, opts.port);
    options.set_keep_alive(Duration::from_secs(opts.keep_alive_secs as u64));
    options.set_clean_session(true);

    if let Some(user) = &opts.username {
        options.set_credentials(user, opts.password.clone().unwrap_or_default());
    }

    if let Some(LastWill { topic, payload, qos, retain }) = &opts.last_will {
        options.set_last_will(rumqttc::LastWill::new(
            topic,
            payload.clone(),
            to_rumqttc_qos(*qos),
            *retain,
        ));
    }

    options
}

impl MqttClient for RumqttcClient {
    type Error = MqttError;

    fn connect(&mut self, opts: &ConnectOptions) -> Result<(), MqttError> {
        self.disconnect();

        let (client, mut connection) = Client::new(mqtt_options(opts), REQUEST_CAPACITY);
        let (msg_tx, msg_rx) = mpsc::channel();
        let (ack_tx, ack_rx) = mpsc::sync_channel::<Result<(), String>>(1);

        // Fresh flag per connection so a stale loop cannot flip the new one
        let connected = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&connected);

        thread::Builder::new()
            .name("mqtt-eventloop".into())
            .spawn(move || {
                let mut ack_tx = Some(ack_tx);
                for notification in connection.iter() {
                    match notification {
                        Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                            let accepted = ack.code == ConnectReturnCode::Success;
                            flag.store(accepted, Ordering::SeqCst);
                            if let Some(tx) = ack_tx.take() {
                                let result = if accepted {
                                    Ok(())
                                } else {
                                    Err(format!("{:?}", ack.code))
                                };
                                let _ = tx.send(result);
                            }
                            if !accepted {
                                break;
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let msg = MqttMessage::new(publish.topic.clone(), publish.payload.to_vec());
                            if msg_tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            if let Some(tx) = ack_tx.take() {
                                let _ = tx.send(Err(e.to_string()));
                            } else {
                                warn!("MQTT connection error: {}", e);
                            }
                            break;
                        }
                    }
                }
                flag.store(false, Ordering::SeqCst);
                debug!("MQTT event loop exited");
            })
            .map_err(|e| MqttError::Spawn(e.to_string()))?;

        let timeout = Duration::from_millis(opts.connect_timeout_ms as u64);
        match ack_rx.recv_timeout(timeout) {
            Ok(Ok(())) => {
                info!("MQTT broker {}:{} accepted connection", opts.host, opts.port);
                self.client = Some(client);
                self.incoming = Some(msg_rx);
                self.connected = connected;
                Ok(())
            }
            Ok(Err(reason)) => Err(MqttError::Refused(reason)),
            Err(RecvTimeoutError::Timeout) => {
                let _ = client.try_disconnect();
                Err(MqttError::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(MqttError::Refused("event loop ended".into()))
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = client.try_disconnect();
        }
        self.incoming = None;
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.client.is_some() && self.connected.load(Ordering::SeqCst)
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), MqttError> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }
        let client = self.client.as_ref().ok_or(MqttError::NotConnected)?;
        let qos = if retain {
            rumqttc::QoS::AtLeastOnce
        } else {
            rumqttc::QoS::AtMostOnce
        };
        client
            .try_publish(topic, qos, retain, payload.to_vec())
            .map_err(|e| MqttError::Request(e.to_string()))
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), MqttError> {
        let client = self.client.as_ref().ok_or(MqttError::NotConnected)?;
        client
            .try_subscribe(topic, to_rumqttc_qos(qos))
            .map_err(|e| MqttError::Request(e.to_string()))
    }

    fn try_recv(&mut self) -> Option<MqttMessage> {
        self.incoming.as_ref()?.try_recv().ok()
    }
}
