//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for all hardware, network and storage
//! traits, enabling development and testing on desktop without an ESP32.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockPwm`] | [`PwmOutput`] | Records every duty written |
//! | [`MockClock`] | [`Clock`] | Controllable time source |
//! | [`MockMqtt`] | [`MqttClient`] | Captures connect/pub/sub, injectable failures |
//! | [`MockStore`] | [`KeyValueStore`] | In-memory key-value map |
//!
//! # Example
//!
//! ```rust
//! use rs_fanctl::{SpeedController, hal::MockPwm};
//!
//! let mut controller = SpeedController::new(MockPwm::new());
//! controller.set_speed(25, 0).unwrap();
//!
//! // Active-low: 25% of 1023 is 256, so the pin sees 1023 - 256
//! assert_eq!(controller.pwm().duty, Some(767));
//! ```

extern crate alloc;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::duty::DEFAULT_RESOLUTION_BITS;
use crate::traits::{
    Clock, ConnectOptions, KeyValueStore, MqttClient, MqttMessage, PwmOutput, QoS,
};

// ============================================================================
// Hardware Mocks
// ============================================================================

/// Mock PWM output for testing.
///
/// Records every raw duty written (after active-low inversion). Set
/// `fail` to make writes return an error, or `fail_next` to reject only
/// the next few.
///
/// # Example
///
/// ```rust
/// use rs_fanctl::hal::MockPwm;
/// use rs_fanctl::traits::PwmOutput;
///
/// let mut pwm = MockPwm::new();
/// pwm.set_duty(100).unwrap();
/// pwm.set_duty(200).unwrap();
///
/// assert_eq!(pwm.duty, Some(200));
/// assert_eq!(pwm.writes, vec![100, 200]);
/// ```
#[derive(Debug)]
pub struct MockPwm {
    /// Timer resolution reported to the controller.
    pub bits: u8,
    /// Last raw duty written, `None` before the first write.
    pub duty: Option<u32>,
    /// Every raw duty written, in order.
    pub writes: Vec<u32>,
    /// When true, `set_duty` fails without recording.
    pub fail: bool,
    /// Number of upcoming writes to reject, then succeed again.
    pub fail_next: usize,
}

impl MockPwm {
    /// Creates a 10-bit mock output.
    pub fn new() -> Self {
        Self::with_bits(DEFAULT_RESOLUTION_BITS)
    }

    /// Creates a mock output with the given resolution.
    pub fn with_bits(bits: u8) -> Self {
        Self {
            bits,
            duty: None,
            writes: Vec::new(),
            fail: false,
            fail_next: 0,
        }
    }
}

impl Default for MockPwm {
    fn default() -> Self {
        Self::new()
    }
}

impl PwmOutput for MockPwm {
    type Error = ();

    fn resolution_bits(&self) -> u8 {
        self.bits
    }

    fn set_duty(&mut self, duty: u32) -> Result<(), ()> {
        if self.fail {
            return Err(());
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(());
        }
        self.duty = Some(duty);
        self.writes.push(duty);
        Ok(())
    }
}

/// Mock clock for testing.
///
/// Provides a controllable time source for testing time-dependent behavior.
///
/// # Example
///
/// ```rust
/// use rs_fanctl::hal::MockClock;
/// use rs_fanctl::traits::Clock;
///
/// let mut clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.set(1000);
/// assert_eq!(clock.now_ms(), 1000);
///
/// clock.advance(500);
/// assert_eq!(clock.now_ms(), 1500);
/// ```
#[derive(Debug)]
pub struct MockClock {
    current_ms: u64,
}

impl MockClock {
    /// Creates a new mock clock starting at 0ms.
    pub fn new() -> Self {
        Self { current_ms: 0 }
    }

    /// Sets the current time in milliseconds.
    pub fn set(&mut self, ms: u64) {
        self.current_ms = ms;
    }

    /// Advances the clock by the given duration.
    pub fn advance(&mut self, ms: u64) {
        self.current_ms += ms;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.current_ms
    }
}

// ============================================================================
// Network Mocks
// ============================================================================

/// Mock MQTT client for testing.
///
/// Starts disconnected. Records connect attempts, publishes and
/// subscriptions, and lets tests inject incoming messages, refused
/// connections and failed publishes.
///
/// # Example
///
/// ```rust
/// use rs_fanctl::hal::MockMqtt;
/// use rs_fanctl::traits::{ConnectOptions, MqttClient};
///
/// let mut mqtt = MockMqtt::new();
/// assert!(!mqtt.is_connected());
///
/// mqtt.fail_connect = true;
/// let opts = ConnectOptions {
///     client_id: "fan-test".into(),
///     host: "localhost".into(),
///     port: 1883,
///     username: None,
///     password: None,
///     keep_alive_secs: 45,
///     connect_timeout_ms: 5000,
///     last_will: None,
/// };
/// assert!(mqtt.connect(&opts).is_err());
/// assert_eq!(mqtt.connect_attempts, 1);
///
/// mqtt.fail_connect = false;
/// mqtt.connect(&opts).unwrap();
/// mqtt.publish("fan/status", b"online", true).unwrap();
/// assert_eq!(mqtt.published_to("fan/status").len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockMqtt {
    /// Whether the client is connected.
    pub connected: bool,
    /// Refuse connect attempts.
    pub fail_connect: bool,
    /// Fail publishes (the connection stays up).
    pub fail_publish: bool,
    /// Number of `connect` calls.
    pub connect_attempts: usize,
    /// Number of `disconnect` calls.
    pub disconnects: usize,
    /// Options of the last connect attempt.
    pub last_connect: Option<ConnectOptions>,
    /// Messages that have been published (topic, payload, retain).
    pub published: Vec<(String, Vec<u8>, bool)>,
    /// Topics that have been subscribed to.
    pub subscriptions: Vec<(String, QoS)>,
    /// Queue of incoming messages to be returned by `try_recv()`.
    pub incoming: Vec<MqttMessage>,
}

impl MockMqtt {
    /// Creates a new mock MQTT client in disconnected state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an incoming message
    pub fn queue_message(&mut self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        self.incoming.push(MqttMessage::new(topic, payload));
    }

    /// Check if a topic was subscribed to
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.iter().any(|(t, _)| t == topic)
    }

    /// Get published messages for a topic
    pub fn published_to(&self, topic: &str) -> Vec<&(String, Vec<u8>, bool)> {
        self.published
            .iter()
            .filter(|(t, _, _)| t == topic)
            .collect()
    }

    /// Payloads published to a topic, as strings.
    pub fn payloads_to(&self, topic: &str) -> Vec<String> {
        self.published_to(topic)
            .into_iter()
            .map(|(_, p, _)| String::from_utf8_lossy(p).to_string())
            .collect()
    }

    /// Simulate the broker dropping the connection.
    pub fn drop_connection(&mut self) {
        self.connected = false;
    }
}

impl MqttClient for MockMqtt {
    type Error = ();

    fn connect(&mut self, options: &ConnectOptions) -> Result<(), ()> {
        self.connect_attempts += 1;
        self.last_connect = Some(options.clone());
        if self.fail_connect {
            return Err(());
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), ()> {
        if !self.connected || self.fail_publish {
            return Err(());
        }
        self.published.push((topic.into(), payload.to_vec(), retain));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), ()> {
        if !self.connected {
            return Err(());
        }
        self.subscriptions.push((topic.into(), qos));
        Ok(())
    }

    fn try_recv(&mut self) -> Option<MqttMessage> {
        if self.incoming.is_empty() {
            None
        } else {
            Some(self.incoming.remove(0))
        }
    }
}

// ============================================================================
// Storage Mocks
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
enum StoredValue {
    Bool(bool),
    I32(i32),
    Str(String),
}

/// In-memory key-value store for testing.
///
/// # Example
///
/// ```rust
/// use rs_fanctl::hal::MockStore;
/// use rs_fanctl::traits::KeyValueStore;
///
/// let mut store = MockStore::new();
/// store.put_i32("fan_def_spd", 40).unwrap();
/// assert_eq!(store.get_i32("fan_def_spd").unwrap(), Some(40));
/// assert_eq!(store.get_i32("missing").unwrap(), None);
/// assert_eq!(store.write_count, 1);
/// ```
#[derive(Debug, Default)]
pub struct MockStore {
    values: BTreeMap<String, StoredValue>,
    /// Number of successful writes.
    pub write_count: usize,
    /// When true, every write fails.
    pub fail_writes: bool,
}

impl MockStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn put(&mut self, key: &str, value: StoredValue) -> Result<(), ()> {
        if self.fail_writes {
            return Err(());
        }
        self.values.insert(key.into(), value);
        self.write_count += 1;
        Ok(())
    }
}

impl KeyValueStore for MockStore {
    type Error = ();

    fn get_bool(&self, key: &str) -> Result<Option<bool>, ()> {
        Ok(match self.values.get(key) {
            Some(StoredValue::Bool(v)) => Some(*v),
            _ => None,
        })
    }

    fn get_i32(&self, key: &str) -> Result<Option<i32>, ()> {
        Ok(match self.values.get(key) {
            Some(StoredValue::I32(v)) => Some(*v),
            _ => None,
        })
    }

    fn get_str(&self, key: &str) -> Result<Option<String>, ()> {
        Ok(match self.values.get(key) {
            Some(StoredValue::Str(v)) => Some(v.clone()),
            _ => None,
        })
    }

    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), ()> {
        self.put(key, StoredValue::Bool(value))
    }

    fn put_i32(&mut self, key: &str, value: i32) -> Result<(), ()> {
        self.put(key, StoredValue::I32(value))
    }

    fn put_str(&mut self, key: &str, value: &str) -> Result<(), ()> {
        self.put(key, StoredValue::Str(value.into()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ConnectOptions {
        ConnectOptions {
            client_id: "fan-000000000000".into(),
            host: "localhost".into(),
            port: 1883,
            username: None,
            password: None,
            keep_alive_secs: 45,
            connect_timeout_ms: 5000,
            last_will: None,
        }
    }

    // =========================================================================
    // MockPwm Tests
    // =========================================================================

    #[test]
    fn mock_pwm_default() {
        let pwm = MockPwm::new();
        assert_eq!(pwm.resolution_bits(), 10);
        assert_eq!(pwm.duty, None);
        assert!(pwm.writes.is_empty());
    }

    #[test]
    fn mock_pwm_failure_not_recorded() {
        let mut pwm = MockPwm::with_bits(8);
        pwm.fail = true;
        assert!(pwm.set_duty(10).is_err());
        assert_eq!(pwm.duty, None);
        assert_eq!(pwm.resolution_bits(), 8);
    }

    // =========================================================================
    // MockClock Tests
    // =========================================================================

    #[test]
    fn mock_clock_advance() {
        let mut clock = MockClock::default();
        clock.advance(100);
        clock.advance(250);
        assert_eq!(clock.now_ms(), 350);
    }

    // =========================================================================
    // MockMqtt Tests
    // =========================================================================

    #[test]
    fn mock_mqtt_starts_disconnected() {
        let mqtt = MockMqtt::new();
        assert!(!mqtt.is_connected());
        assert_eq!(mqtt.connect_attempts, 0);
    }

    #[test]
    fn mock_mqtt_publish_requires_connection() {
        let mut mqtt = MockMqtt::new();
        assert!(mqtt.publish("t", b"x", false).is_err());

        mqtt.connect(&options()).unwrap();
        mqtt.publish("t", b"x", false).unwrap();
        assert_eq!(mqtt.payloads_to("t"), vec!["x".to_string()]);
    }

    #[test]
    fn mock_mqtt_fail_publish_keeps_connection() {
        let mut mqtt = MockMqtt::new();
        mqtt.connect(&options()).unwrap();
        mqtt.fail_publish = true;
        assert!(mqtt.publish("t", b"x", true).is_err());
        assert!(mqtt.is_connected());
    }

    #[test]
    fn mock_mqtt_records_subscription_qos() {
        let mut mqtt = MockMqtt::new();
        mqtt.connect(&options()).unwrap();
        mqtt.subscribe("fan/cmd", QoS::AtLeastOnce).unwrap();
        assert!(mqtt.is_subscribed("fan/cmd"));
        assert_eq!(mqtt.subscriptions[0].1, QoS::AtLeastOnce);
    }

    #[test]
    fn mock_mqtt_incoming_fifo() {
        let mut mqtt = MockMqtt::new();
        mqtt.queue_message("fan/cmd", b"10".to_vec());
        mqtt.queue_message("fan/cmd", b"20".to_vec());
        assert_eq!(mqtt.try_recv().unwrap().payload, b"10");
        assert_eq!(mqtt.try_recv().unwrap().payload, b"20");
        assert!(mqtt.try_recv().is_none());
    }

    #[test]
    fn mock_mqtt_disconnect_counts() {
        let mut mqtt = MockMqtt::new();
        mqtt.connect(&options()).unwrap();
        mqtt.disconnect();
        assert!(!mqtt.is_connected());
        assert_eq!(mqtt.disconnects, 1);
    }

    // =========================================================================
    // MockStore Tests
    // =========================================================================

    #[test]
    fn mock_store_types_are_separate() {
        let mut store = MockStore::new();
        store.put_bool("k", true).unwrap();
        assert_eq!(store.get_bool("k").unwrap(), Some(true));
        assert_eq!(store.get_i32("k").unwrap(), None);
        assert_eq!(store.get_str("k").unwrap(), None);
    }

    #[test]
    fn mock_store_fail_writes() {
        let mut store = MockStore::new();
        store.fail_writes = true;
        assert!(store.put_str("k", "v").is_err());
        assert!(store.is_empty());
        assert_eq!(store.write_count, 0);
    }
}
