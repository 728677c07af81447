//! Network abstraction for the MQTT session.
//!
//! The session layer owns connection policy (when to connect, what to
//! republish). A transport only has to know how to open one connection with
//! the given options, move bytes, and report whether the link is up.
//!
//! # Topics
//!
//! ```text
//! fan/cmd     - Speed commands (subscribed, QoS 1)
//! fan/state   - {"duty":512,"percent":50.0,"setpoint":50} (retained)
//! fan/status  - online / offline (retained, last will)
//! ```

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

// ============================================================================
// MQTT Client Trait (Sync-First Design)
// ============================================================================

/// MQTT client trait for pub/sub messaging.
///
/// Sync-first so it works with esp-idf-svc's blocking client and with a
/// thread-backed rumqttc client on desktop.
///
/// # Implementation Notes
///
/// - `connect` blocks until the broker accepts or a bounded timeout expires
/// - `try_recv` is non-blocking for polling patterns
/// - The client must NOT reconnect on its own; the session manager
///   throttles reconnect attempts
pub trait MqttClient {
    /// Error type for MQTT operations.
    type Error: core::fmt::Debug;

    /// Open a connection to the broker.
    fn connect(&mut self, options: &ConnectOptions) -> Result<(), Self::Error>;

    /// Close the connection. Safe to call when already disconnected.
    fn disconnect(&mut self);

    /// Check if connected to broker.
    fn is_connected(&self) -> bool;

    /// Publish a message to a topic.
    ///
    /// Retained messages are sent at QoS 1, everything else at QoS 0.
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error>;

    /// Subscribe to a topic.
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error>;

    /// Try to receive the next message (non-blocking).
    fn try_recv(&mut self) -> Option<MqttMessage>;
}

/// Delivery guarantee for publish and subscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce,
    /// Acknowledged delivery.
    AtLeastOnce,
}

/// Message the broker publishes on our behalf if the connection drops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LastWill {
    /// Topic for the will message.
    pub topic: String,
    /// Will payload.
    pub payload: Vec<u8>,
    /// Will QoS.
    pub qos: QoS,
    /// Whether the broker retains the will.
    pub retain: bool,
}

impl LastWill {
    /// Create a retained QoS 1 will.
    pub fn retained(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
            retain: true,
        }
    }
}

/// Everything a transport needs to open a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Client identifier, unique per device.
    pub client_id: String,
    /// Broker hostname or IP.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Username (None = anonymous).
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Upper bound on how long `connect` may block, in milliseconds.
    pub connect_timeout_ms: u32,
    /// Last-will message.
    pub last_will: Option<LastWill>,
}

/// An MQTT message received from a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// Message payload as raw bytes.
    pub payload: Vec<u8>,
}

impl MqttMessage {
    /// Create a new MQTT message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Returns the payload as a UTF-8 string, if valid.
    pub fn payload_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok()
    }
}

// ============================================================================
// Link Latch
// ============================================================================

/// Connected flag shared between a transport and its event thread.
///
/// Once the link drops it stays down, even if the underlying client
/// reconnects on its own. Only a fresh latch (a new `connect`) comes up again.
#[derive(Debug, Default)]
pub struct LinkLatch {
    up: AtomicBool,
    lost: AtomicBool,
}

impl LinkLatch {
    /// A latch that has not seen the broker yet.
    pub const fn new() -> Self {
        Self {
            up: AtomicBool::new(false),
            lost: AtomicBool::new(false),
        }
    }

    /// Broker accepted the session. Ignored after a drop.
    pub fn on_connected(&self) {
        if !self.lost.load(Ordering::SeqCst) {
            self.up.store(true, Ordering::SeqCst);
        }
    }

    /// Link went away.
    pub fn on_disconnected(&self) {
        self.lost.store(true, Ordering::SeqCst);
        self.up.store(false, Ordering::SeqCst);
    }

    /// Whether the link is up.
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_comes_up_once() {
        let latch = LinkLatch::new();
        assert!(!latch.is_up());

        latch.on_connected();
        assert!(latch.is_up());

        latch.on_disconnected();
        assert!(!latch.is_up());

        // A client-side auto-reconnect must not revive it
        latch.on_connected();
        assert!(!latch.is_up());
    }

    #[test]
    fn latch_refused_before_connect_stays_down() {
        let latch = LinkLatch::default();
        latch.on_disconnected();
        latch.on_connected();
        assert!(!latch.is_up());
    }

    #[test]
    fn last_will_retained_is_qos1() {
        let will = LastWill::retained("fan/status", "offline");
        assert_eq!(will.topic, "fan/status");
        assert_eq!(will.payload, b"offline");
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
    }

    #[test]
    fn message_payload_str() {
        let msg = MqttMessage::new("fan/cmd", b"42".to_vec());
        assert_eq!(msg.payload_str(), Some("42"));

        let bad = MqttMessage::new("fan/cmd", vec![0xff, 0xfe]);
        assert_eq!(bad.payload_str(), None);
    }

    #[test]
    fn qos_default_is_at_most_once() {
        assert_eq!(QoS::default(), QoS::AtMostOnce);
    }
}
